//! Jobs waiting to enter the cluster, grouped by named priorities.
use crate::{
    cluster::Cluster,
    job::Job,
    reader::{ReadError, TokenReader},
};
use getset::CopyGetters;
use log::debug;
use std::collections::{BTreeMap, VecDeque};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Default, CopyGetters)]
pub struct Priority {
    jobs: VecDeque<Job>,
    /// jobs sent to the cluster
    #[getset(get_copy = "pub")]
    accepted: u32,
    /// attempts the cluster turned down
    #[getset(get_copy = "pub")]
    rejected: u32,
}

impl Priority {
    pub fn exists(&self, job_id: i32) -> bool {
        self.jobs.iter().any(|job| job.id() == job_id)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Queued jobs, oldest first.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for job in &self.jobs {
            job.write_line(out)?;
        }
        writeln!(out, "{} {}", self.accepted, self.rejected)
    }
}

/// Priorities are served in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct WaitingArea {
    priorities: BTreeMap<String, Priority>,
}

impl WaitingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<n> <priority>*n <m> (<priority> <job>)*m`
    pub fn read<R: BufRead>(reader: &mut TokenReader<R>) -> Result<Self, ReadError> {
        let mut waiting_area = Self::new();
        let num_priorities: usize = reader.read("number of priorities")?;
        for _ in 0..num_priorities {
            let priority_id = reader.expect_token("priority id")?;
            if waiting_area.exists_priority(&priority_id) {
                return Err(ReadError::Parse {
                    token: priority_id,
                    expected: "unique priority id",
                });
            }
            waiting_area.add_priority(&priority_id);
        }
        let num_jobs: usize = reader.read("number of waiting jobs")?;
        for _ in 0..num_jobs {
            let priority_id = reader.expect_token("priority id")?;
            let job = reader.read_job()?;
            let Some(priority) = waiting_area.priority(&priority_id) else {
                return Err(ReadError::Parse {
                    token: priority_id,
                    expected: "existing priority id",
                });
            };
            if priority.exists(job.id()) {
                return Err(ReadError::Parse {
                    token: job.id().to_string(),
                    expected: "job id not yet waiting in its priority",
                });
            }
            waiting_area.add_job(&priority_id, job);
        }
        Ok(waiting_area)
    }

    pub fn exists_priority(&self, priority_id: &str) -> bool {
        self.priorities.contains_key(priority_id)
    }

    pub fn priority(&self, priority_id: &str) -> Option<&Priority> {
        self.priorities.get(priority_id)
    }

    fn priority_mut(&mut self, priority_id: &str) -> &mut Priority {
        self.priorities
            .get_mut(priority_id)
            .unwrap_or_else(|| panic!("Priority {} does not exist", priority_id))
    }

    pub fn add_priority(&mut self, priority_id: &str) {
        assert!(
            !self.exists_priority(priority_id),
            "Priority {} already exists",
            priority_id
        );
        self.priorities
            .insert(priority_id.to_string(), Priority::default());
    }

    pub fn remove_priority(&mut self, priority_id: &str) {
        let priority = self.priority_mut(priority_id);
        assert!(
            priority.is_empty(),
            "Priority {} still has waiting jobs",
            priority_id
        );
        self.priorities.remove(priority_id);
    }

    pub fn add_job(&mut self, priority_id: &str, job: Job) {
        let priority = self.priority_mut(priority_id);
        assert!(
            !priority.exists(job.id()),
            "Job {} is already waiting in priority {}",
            job.id(),
            priority_id
        );
        priority.jobs.push_back(job);
    }

    /// Tries each waiting job once, highest priority and oldest first, until `n` jobs
    /// have been placed. Rejected jobs go back to the end of their priority.
    /// Returns the number of jobs placed.
    pub fn send_to_cluster(&mut self, n: usize, cluster: &mut Cluster) -> usize {
        let mut placed = 0;
        for (priority_id, priority) in self.priorities.iter_mut() {
            let pending = priority.jobs.len();
            for _ in 0..pending {
                if placed == n {
                    return placed;
                }
                let job = priority
                    .jobs
                    .pop_front()
                    .expect("Pending jobs are counted before the walk");
                let job_id = job.id();
                match cluster.place_queued_job(job) {
                    Ok(processor_id) => {
                        debug!(
                            "Sent job {} of priority {} to processor {}",
                            job_id, priority_id, processor_id
                        );
                        priority.accepted += 1;
                        placed += 1;
                    }
                    Err(job) => {
                        priority.rejected += 1;
                        priority.jobs.push_back(job);
                    }
                }
            }
        }
        placed
    }

    pub fn write_priority<W: Write>(&self, priority_id: &str, out: &mut W) -> io::Result<()> {
        self.priority(priority_id)
            .unwrap_or_else(|| panic!("Priority {} does not exist", priority_id))
            .write(out)
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (priority_id, priority) in &self.priorities {
            writeln!(out, "{}", priority_id)?;
            priority.write(out)?;
        }
        Ok(())
    }
}
