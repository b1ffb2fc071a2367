//! Forks a pipeline of one or more commands, wires pipes between adjacent
//! stages, assigns them all to a single process group, optionally hands the
//! terminal to that group, and either waits (foreground) or returns
//! immediately (background).
//!
//! Stages are launched via `std::process::Command`, which forks and execs
//! in one call; `pre_exec` runs in the child between fork and exec to reset
//! ignored signals and join the pipeline's process group.

use os_pipe::pipe;
use std::io;
use std::process::{Child, Command, Stdio};

use crate::job_control::{self, ForegroundTerminalGuard, WaitOutcome};
use crate::jobs::JobTable;

/// Outcome of launching one pipeline. `SoftError` is reported to the user
/// and never terminates the shell.
pub enum PipelineOutcome {
    Ok,
    SoftError,
}

fn report(message: &str) {
    println!("{message}");
}

/// Run the pipeline named by `stages` (one argv per stage, `stages.len() ==
/// job_table.get(job_id).pipeline_len`). `job_id` is the Job the REPL
/// driver already allocated for this line; this function fills in its
/// `pgid` and, for a foreground pipeline, removes it once the pipeline
/// finishes.
pub fn run(job_id: usize, stages: &[Vec<String>], background: bool, job_table: &mut JobTable) -> PipelineOutcome {
    let mut children: Vec<Child> = Vec::new();
    let mut pgid: Option<libc::pid_t> = None;
    let mut prev_read: Option<os_pipe::PipeReader> = None;
    let last_index = stages.len() - 1;

    for (i, argv) in stages.iter().enumerate() {
        let is_last = i == last_index;

        // A single-stage pipeline never creates a pipe; its stdout is the terminal.
        let (next_read, stdout_writer) = if is_last {
            (None, None)
        } else {
            match pipe() {
                Ok((reader, writer)) => (Some(reader), Some(writer)),
                Err(e) => {
                    report(&format!("wsh: pipe: {e}"));
                    // Stop launching further stages; wait for the ones
                    // already forked, then abandon the line.
                    wait_already_forked(pgid, &children);
                    job_table.kill(job_id);
                    return PipelineOutcome::SoftError;
                }
            }
        };

        let stdin_stdio = match prev_read.take() {
            Some(reader) => Stdio::from(reader),
            None => Stdio::inherit(),
        };
        let stdout_stdio = match stdout_writer {
            Some(writer) => Stdio::from(writer),
            None => Stdio::inherit(),
        };

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command.stdin(stdin_stdio).stdout(stdout_stdio);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let target_pgid = pgid.unwrap_or(0);
            unsafe {
                command.pre_exec(move || {
                    // Reset terminal signals the shell ignores back to
                    // default so the child is interruptible.
                    for &sig in &[libc::SIGINT, libc::SIGTSTP, libc::SIGTTOU] {
                        if libc::signal(sig, libc::SIG_DFL) == libc::SIG_ERR {
                            return Err(io::Error::last_os_error());
                        }
                    }
                    // setpgid(self, pgid_or_self): 0 creates a new group
                    // with this process as leader (first stage); a known
                    // pgid joins that group (later stages).
                    if libc::setpgid(0, target_pgid) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                report(&spawn_error_message(&argv[0], &e));
                wait_already_forked(pgid, &children);
                job_table.kill(job_id);
                return PipelineOutcome::SoftError;
            }
        };

        let child_pid = child.id() as libc::pid_t;

        #[cfg(unix)]
        {
            // Parent-side half of the double-setpgid: whichever of the
            // child (via pre_exec) or the parent (here) runs first wins;
            // the loser's EACCES/ESRCH is tolerated.
            let target_pgid = pgid.unwrap_or(child_pid);
            let _ = job_control::set_process_group(child_pid, target_pgid);
        }

        if i == 0 {
            pgid = Some(child_pid);
            if let Some(job) = job_table.get_mut(job_id) {
                job.pgid = child_pid;
            }
        }

        children.push(child);
        prev_read = next_read;
    }

    let pgid = pgid.expect("at least one stage always launches when stages is non-empty");
    let last_pid = children
        .last()
        .expect("at least one child always launches")
        .id() as libc::pid_t;

    if background {
        // Leave the Job alive; never touch the terminal.
        return PipelineOutcome::Ok;
    }

    let guard = match ForegroundTerminalGuard::new(pgid) {
        Ok(guard) => Some(guard),
        Err(e) => {
            report(&format!("wsh: failed to claim terminal: {e}"));
            None
        }
    };

    let outcome = job_control::wait_for_last_in_group(pgid, last_pid);
    drop(guard);

    match outcome {
        Ok(WaitOutcome::Exited(_)) => {
            job_table.kill(job_id);
        }
        Ok(WaitOutcome::Stopped) => {
            // Job stays in the table, still marked foreground, so a later
            // `fg`/`bg` can act on it (mirrors the built-in dispatcher).
        }
        Err(e) => {
            report(&format!("wsh: waitpid failed: {e}"));
            job_table.kill(job_id);
            return PipelineOutcome::SoftError;
        }
    }

    PipelineOutcome::Ok
}

/// Best-effort wait for stages that were already forked before a later
/// stage failed to launch. Non-fatal regardless of outcome.
fn wait_already_forked(pgid: Option<libc::pid_t>, children: &[Child]) {
    let Some(pgid) = pgid else { return };
    if children.is_empty() {
        return;
    }
    let last_pid = children.last().expect("checked non-empty above").id() as libc::pid_t;
    let _ = job_control::wait_for_last_in_group(pgid, last_pid);
}

fn spawn_error_message(program: &str, e: &io::Error) -> String {
    if e.kind() == io::ErrorKind::NotFound {
        format!("wsh: {program}: command not found")
    } else {
        format!("wsh: {program}: {e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_stage_foreground_pipeline_runs_and_clears_job() {
        let mut table = JobTable::new();
        let id = table.allocate("true".into(), 1, false).unwrap();
        let outcome = run(id, &[vec!["true".to_string()]], false, &mut table);
        assert!(matches!(outcome, PipelineOutcome::Ok));
        assert!(table.get(id).is_none());
    }

    #[test]
    fn unknown_program_reports_soft_error_and_clears_foreground_job() {
        let mut table = JobTable::new();
        let id = table
            .allocate("no-such-program-xyz".into(), 1, false)
            .unwrap();
        let outcome = run(
            id,
            &[vec!["no-such-program-xyz".to_string()]],
            false,
            &mut table,
        );
        assert!(matches!(outcome, PipelineOutcome::SoftError));
        assert!(table.get(id).is_none());
    }

    #[test]
    fn background_pipeline_leaves_job_in_table() {
        let mut table = JobTable::new();
        let id = table.allocate("sleep 1 &".into(), 1, true).unwrap();
        let outcome = run(id, &[vec!["sleep".to_string(), "1".to_string()]], true, &mut table);
        assert!(matches!(outcome, PipelineOutcome::Ok));
        assert!(table.get(id).is_some());
        // Clean up the child so the test process doesn't leave a runaway sleep.
        if let Some(job) = table.get(id) {
            unsafe { libc::kill(-job.pgid, libc::SIGKILL) };
        }
    }
}
