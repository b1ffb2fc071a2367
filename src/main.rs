mod builtins;
mod executor;
mod job_control;
mod jobs;
mod parser;
mod repl;
mod status;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // No args → interactive; one arg → batch on that file; anything else
    // is a silent no-op.
    let code = match args.len() {
        1 => {
            repl::init().expect("failed to claim shell process group and terminal");
            repl::run_interactive()
        }
        2 => {
            repl::init().expect("failed to claim shell process group and terminal");
            repl::run_batch(&args[1])
        }
        _ => return,
    };

    std::process::exit(code);
}
