//! Owns the shell process-group and terminal ownership at rest; reads
//! lines, dispatches to the builtin dispatcher or the pipeline executor,
//! then runs the reaper before re-prompting.

use std::io::{self, BufRead, Write};

use crate::builtins::{self, DispatchOutcome};
use crate::executor;
use crate::jobs::JobTable;
use crate::parser;

const PROMPT: &str = "wsh> ";

/// Claim the process group and controlling terminal, install the shell's
/// signal discipline. Must run once before either `run_interactive` or
/// `run_batch`. Failure here means the process cannot proceed as a shell.
pub fn init() -> io::Result<()> {
    crate::job_control::init_shell(libc::STDIN_FILENO)?;
    Ok(())
}

/// Interactive mode: prompt before every read, input from stdin.
pub fn run_interactive() -> i32 {
    let stdin = io::stdin();
    run(stdin.lock(), true)
}

/// Batch mode: no prompt, input from `path`. Exits non-zero if the file
/// cannot be opened.
pub fn run_batch(path: &str) -> i32 {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(_) => {
            println!("Unable to open batch file");
            return 1;
        }
    };
    run(io::BufReader::new(file), false)
}

fn run<R: BufRead>(mut reader: R, interactive: bool) -> i32 {
    let mut job_table = JobTable::new();

    loop {
        if interactive {
            print!("{PROMPT}");
            if io::stdout().flush().is_err() {
                return 0;
            }
        }

        let mut line = String::new();
        let bytes_read = match reader.read_line(&mut line) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return 0,
        };

        if bytes_read == 0 {
            // End-of-stream: clean shell exit.
            return 0;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if process_line(trimmed, &mut job_table) {
            return 0;
        }

        job_table.reap();
    }
}

/// Parse and execute one non-empty line. Returns `true` if the shell
/// should exit cleanly.
fn process_line(line: &str, job_table: &mut JobTable) -> bool {
    let parsed = match parser::parse_line(line) {
        Ok(parsed) => parsed,
        Err(message) => {
            println!("{message}");
            return false;
        }
    };

    let pipeline_len = parsed.commands.len();
    let job_id = match job_table.allocate(line.to_string(), pipeline_len, parsed.background) {
        Ok(id) => id,
        Err(_) => {
            println!("wsh: job table full");
            return false;
        }
    };

    if pipeline_len == 1 && builtins::is_builtin(&parsed.commands[0][0]) {
        return matches!(
            builtins::dispatch(&parsed.commands[0], job_id, job_table),
            DispatchOutcome::Exit
        );
    }

    executor::run(job_id, &parsed.commands, parsed.background, job_table);
    false
}
