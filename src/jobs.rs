use crate::job_control;

/// Fixed Job Table capacity.
pub const MAX_JOBS: usize = 128;

/// The runtime record for one pipeline.
pub struct Job {
    pub id: usize,
    pub pgid: libc::pid_t,
    pub background: bool,
    pub argv_display: String,
    pub pipeline_len: usize,
}

/// Returned by [`JobTable::allocate`] when every slot [1..=MAX_JOBS] is in use.
pub struct TableFull;

/// Fixed-capacity registry mapping job IDs 1..=MAX_JOBS to [`Job`] records.
/// Single owner of job lifecycle; mutated only by the REPL's thread of
/// control, since the shell itself is single-threaded.
pub struct JobTable {
    slots: Vec<Option<Job>>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_JOBS);
        slots.resize_with(MAX_JOBS, || None);
        Self { slots }
    }

    /// Scan slots [1..=MAX_JOBS] in ascending order, insert at the first
    /// empty one. Demotes any currently-foreground job to background as
    /// a side effect, so only the newest Job can be foreground.
    pub fn allocate(
        &mut self,
        argv_display: String,
        pipeline_len: usize,
        background: bool,
    ) -> Result<usize, TableFull> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(TableFull)?;
        let id = index + 1;

        for slot in self.slots.iter_mut().flatten() {
            slot.background = true;
        }

        self.slots[index] = Some(Job {
            id,
            pgid: 0,
            background,
            argv_display,
            pipeline_len,
        });
        Ok(id)
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.slots.get(id.checked_sub(1)?)?.as_ref()
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.slots.get_mut(id.checked_sub(1)?)?.as_mut()
    }

    /// Release the record. Callers must not reference the Job after this.
    pub fn kill(&mut self, id: usize) -> Option<Job> {
        let slot = self.slots.get_mut(id.checked_sub(1)?)?;
        slot.take()
    }

    /// Alive background jobs, ascending by ID (used by the `jobs` built-in).
    pub fn background_ascending(&self) -> Vec<&Job> {
        self.slots
            .iter()
            .flatten()
            .filter(|job| job.background)
            .collect()
    }

    /// Alive background jobs, descending by ID (used for the `fg` default).
    pub fn background_descending(&self) -> Vec<&Job> {
        let mut jobs = self.background_ascending();
        jobs.reverse();
        jobs
    }

    /// Alive foreground jobs, descending by ID (used for the `bg` default).
    /// At most one is ever alive, since `allocate` demotes the previous
    /// foreground job on every new insertion.
    pub fn foreground_descending(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self
            .slots
            .iter()
            .flatten()
            .filter(|job| !job.background)
            .collect();
        jobs.sort_by_key(|job| std::cmp::Reverse(job.id));
        jobs
    }

    /// Non-blocking sweep: for each alive Job, issue a WNOHANG wait on its
    /// process group. A Job is removed as soon as the group's first process
    /// is observed finished (exited or signal-killed) or the group is
    /// already empty. Never blocks.
    pub fn reap(&mut self) {
        let mut done = Vec::new();

        for job in self.slots.iter().flatten() {
            if job.pgid == 0 {
                continue;
            }
            if let Ok(Some(_code)) = job_control::try_reap_group(job.pgid) {
                done.push(job.id);
            }
        }

        for id in done {
            self.kill(id);
        }
    }
}
