use std::process;
use testpath::interpreter;

fn main() {
    // Logging only goes to stderr; stdout belongs to the mocked command.
    let _ = testpath::logging::init_logging();

    let args: Vec<_> = std::env::args_os().skip(1).collect();
    let outcome = interpreter::parse_args(args).and_then(interpreter::execute);
    let code = match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("testpath-stub: {err:#}");
            1
        }
    };
    process::exit(code);
}
