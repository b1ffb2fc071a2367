//! Consulted only when the pipeline is a single command whose argv[0] names
//! a builtin; runs in the shell process itself, never forked.

use std::io::Write;

use crate::job_control;
use crate::jobs::JobTable;

const BUILTINS: &[&str] = &["exit", "cd", "jobs", "fg", "bg"];

/// Returns true if the command name is a builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// What the REPL driver should do after a builtin returns.
pub enum DispatchOutcome {
    Continue,
    Exit,
}

/// Run the builtin named by `argv[0]` with the remaining `argv` as its
/// arguments. `own_job_id` is the Job the REPL allocated for this
/// invocation, kept for uniformity with external pipelines; the dispatcher
/// removes it before returning regardless of outcome, so `jobs` never
/// lists itself.
pub fn dispatch(argv: &[String], own_job_id: usize, job_table: &mut JobTable) -> DispatchOutcome {
    let outcome = match argv[0].as_str() {
        "exit" => builtin_exit(),
        "cd" => builtin_cd(argv),
        "jobs" => builtin_jobs(own_job_id, job_table),
        "fg" => builtin_fg(argv, job_table),
        "bg" => builtin_bg(argv, job_table),
        _ => unreachable!("dispatch called on a non-builtin name"),
    };

    job_table.kill(own_job_id);
    outcome
}

fn report(message: &str) {
    println!("{message}");
    let _ = std::io::stdout().flush();
}

fn builtin_exit() -> DispatchOutcome {
    DispatchOutcome::Exit
}

fn builtin_cd(argv: &[String]) -> DispatchOutcome {
    if argv.len() != 2 {
        report("cd: wrong number of arguments");
        return DispatchOutcome::Continue;
    }

    if let Err(e) = std::env::set_current_dir(&argv[1]) {
        report(&format!("cd: {}: {e}", argv[1]));
    }

    DispatchOutcome::Continue
}

/// Print every alive background Job other than `own_job_id`, ascending by
/// ID, as `"<id>: <argv...>"`.
fn builtin_jobs(own_job_id: usize, job_table: &JobTable) -> DispatchOutcome {
    for job in job_table.background_ascending() {
        if job.id == own_job_id {
            continue;
        }
        report(&format!("{}: {}", job.id, job.argv_display));
    }
    DispatchOutcome::Continue
}

/// Resolve an `fg`/`bg` target from 0 or 1 numeric args.
fn resolve_target(argv: &[String]) -> Result<Option<usize>, String> {
    match argv.len() {
        1 => Ok(None),
        2 => argv[1]
            .parse::<usize>()
            .map(Some)
            .map_err(|_| format!("{}: {}: no such job", argv[0], argv[1])),
        _ => Err(format!("{}: too many arguments", argv[0])),
    }
}

fn builtin_fg(argv: &[String], job_table: &mut JobTable) -> DispatchOutcome {
    // Default selection: the highest background job ID.
    let target_id = match resolve_target(argv) {
        Ok(Some(id)) => id,
        Ok(None) => match job_table.background_descending().first() {
            Some(job) => job.id,
            None => {
                report("fg: no background jobs");
                return DispatchOutcome::Continue;
            }
        },
        Err(msg) => {
            report(&msg);
            return DispatchOutcome::Continue;
        }
    };

    let pgid = match job_table.get(target_id) {
        Some(job) if job.background => job.pgid,
        Some(_) => {
            report(&format!("fg: job {target_id} is already in the foreground"));
            return DispatchOutcome::Continue;
        }
        None => {
            report(&format!("fg: {target_id}: no such job"));
            return DispatchOutcome::Continue;
        }
    };

    if let Some(job) = job_table.get_mut(target_id) {
        job.background = false;
    }

    if let Err(e) = job_control::send_continue_to_group(pgid) {
        report(&format!("fg: failed to resume job {target_id}: {e}"));
        return DispatchOutcome::Continue;
    }

    let guard = match job_control::ForegroundTerminalGuard::new(pgid) {
        Ok(guard) => Some(guard),
        Err(e) => {
            report(&format!(
                "fg: failed to claim terminal for job {target_id}: {e}"
            ));
            None
        }
    };

    match job_control::wait_for_group_once(pgid) {
        Ok(job_control::WaitOutcome::Exited(_)) => {
            job_table.kill(target_id);
        }
        Ok(job_control::WaitOutcome::Stopped) => {
            // Stays in the table as the (sole) foreground job; a later
            // `fg` or `bg` can act on it again.
        }
        Err(e) => {
            report(&format!("fg: waitpid failed for job {target_id}: {e}"));
        }
    }

    drop(guard);
    DispatchOutcome::Continue
}

/// Mark the target as background. Does *not* send SIGCONT, so `bg` on a
/// job stopped by SIGTSTP will not actually resume it — only useful on a
/// job that is already running.
fn builtin_bg(argv: &[String], job_table: &mut JobTable) -> DispatchOutcome {
    // Default selection: the highest foreground job ID. At most one
    // foreground job is ever alive (`allocate` demotes the rest).
    let target_id = match resolve_target(argv) {
        Ok(Some(id)) => id,
        Ok(None) => match job_table.foreground_descending().first() {
            Some(job) => job.id,
            None => {
                report("bg: no foreground job");
                return DispatchOutcome::Continue;
            }
        },
        Err(msg) => {
            report(&msg);
            return DispatchOutcome::Continue;
        }
    };

    match job_table.get_mut(target_id) {
        Some(job) if job.background => {
            report(&format!("bg: job {target_id} is already in the background"));
        }
        Some(job) => {
            job.background = true;
        }
        None => {
            report(&format!("bg: {target_id}: no such job"));
        }
    }

    DispatchOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_matches_exactly_the_five_names() {
        for name in ["exit", "cd", "jobs", "fg", "bg"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("echo"));
    }

    #[test]
    fn resolve_target_defaults_on_empty_args() {
        assert_eq!(resolve_target(&["fg".to_string()]).unwrap(), None);
    }

    #[test]
    fn resolve_target_parses_numeric_id() {
        assert_eq!(
            resolve_target(&["fg".to_string(), "3".to_string()]).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn resolve_target_rejects_non_numeric_id() {
        assert!(resolve_target(&["fg".to_string(), "abc".to_string()]).is_err());
    }

    #[test]
    fn resolve_target_rejects_too_many_args() {
        assert!(
            resolve_target(&["fg".to_string(), "1".to_string(), "2".to_string()]).is_err()
        );
    }

    #[test]
    fn dispatch_exit_removes_own_job_and_signals_exit() {
        let mut table = JobTable::new();
        let id = table.allocate("exit".into(), 1, false).unwrap();
        let outcome = dispatch(&["exit".to_string()], id, &mut table);
        assert!(matches!(outcome, DispatchOutcome::Exit));
        assert!(table.get(id).is_none());
    }

    #[test]
    fn dispatch_cd_removes_own_job_and_changes_directory() {
        let mut table = JobTable::new();
        let id = table
            .allocate("cd /tmp".into(), 1, false)
            .unwrap();
        let outcome = dispatch(&["cd".to_string(), "/tmp".to_string()], id, &mut table);
        assert!(matches!(outcome, DispatchOutcome::Continue));
        assert!(table.get(id).is_none());
        assert_eq!(std::env::current_dir().unwrap(), std::path::Path::new("/tmp"));
    }

    #[test]
    fn dispatch_jobs_removes_own_job_even_with_no_targets() {
        let mut table = JobTable::new();
        let id = table.allocate("jobs".into(), 1, false).unwrap();
        dispatch(&["jobs".to_string()], id, &mut table);
        assert!(table.get(id).is_none());
    }

    #[test]
    fn dispatch_bg_on_unknown_id_removes_own_job_and_reports() {
        let mut table = JobTable::new();
        let id = table.allocate("bg 99".into(), 1, false).unwrap();
        dispatch(&["bg".to_string(), "99".to_string()], id, &mut table);
        assert!(table.get(id).is_none());
    }
}
