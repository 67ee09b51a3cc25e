//! Memory allocator of a single processor.
//!
//! The memory `[0, capacity)` is always partitioned between placed jobs (indexed by offset)
//! and free gaps (indexed by size, then offset). Every mutating operation updates both
//! indices before returning.
use crate::job::Job;
use getset::{CopyGetters, Getters};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("job {job_id} of size {size} does not fit, largest gap is {largest_gap}")]
    InsufficientMemory {
        job_id: i32,
        size: usize,
        largest_gap: usize,
    },
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Processor {
    #[getset(get = "pub")]
    id: String,
    #[getset(get_copy = "pub")]
    capacity: usize,
    #[getset(get_copy = "pub")]
    free_memory: usize,
    /// offset -> job occupying `[offset, offset + size)`
    jobs: BTreeMap<usize, Job>,
    /// job id -> offset
    offsets: BTreeMap<i32, usize>,
    /// gap size -> offsets of the gaps with exactly that size
    gaps: BTreeMap<usize, BTreeSet<usize>>,
}

impl Processor {
    pub fn new(id: &str, capacity: usize) -> Self {
        assert!(capacity > 0, "Processor {} must have memory", id);
        let mut processor = Self {
            id: id.to_string(),
            capacity,
            free_memory: capacity,
            jobs: BTreeMap::new(),
            offsets: BTreeMap::new(),
            gaps: BTreeMap::new(),
        };
        processor.insert_gap(0, capacity);
        processor
    }

    fn insert_gap(&mut self, offset: usize, size: usize) {
        if size > 0 {
            self.gaps.entry(size).or_default().insert(offset);
        }
    }

    fn remove_gap(&mut self, offset: usize, size: usize) {
        if let Some(bucket) = self.gaps.get_mut(&size) {
            bucket.remove(&offset);
            if bucket.is_empty() {
                self.gaps.remove(&size);
            }
        }
    }

    /// Size of the gap the best-fit policy would choose for a job of `size`.
    pub fn best_fit_gap(&self, size: usize) -> Option<usize> {
        self.gaps.range(size..).next().map(|(&gap_size, _)| gap_size)
    }

    pub fn largest_gap(&self) -> usize {
        self.gaps.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn exists(&self, job_id: i32) -> bool {
        self.offsets.contains_key(&job_id)
    }

    pub fn job(&self, job_id: i32) -> Option<&Job> {
        self.offsets
            .get(&job_id)
            .and_then(|offset| self.jobs.get(offset))
    }

    /// Placed jobs in ascending offset order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Free gaps as `(offset, size)` in ascending offset order.
    pub fn gaps(&self) -> Vec<(usize, usize)> {
        let mut gaps: Vec<(usize, usize)> = self
            .gaps
            .iter()
            .flat_map(|(&size, offsets)| offsets.iter().map(move |&offset| (offset, size)))
            .collect();
        gaps.sort_unstable();
        gaps
    }

    /// Places `job` in the smallest gap that holds it, lowest offset first among equal sizes.
    /// Returns the offset the job was placed at.
    ///
    /// # Panics
    ///
    /// If a job with the same id is already placed on this processor.
    pub fn place(&mut self, mut job: Job) -> Result<usize, PlacementError> {
        assert!(
            !self.exists(job.id()),
            "Job {} is already placed on processor {}",
            job.id(),
            self.id
        );
        let gap_size = self
            .best_fit_gap(job.size())
            .ok_or(PlacementError::InsufficientMemory {
                job_id: job.id(),
                size: job.size(),
                largest_gap: self.largest_gap(),
            })?;
        let offset = *self.gaps[&gap_size]
            .iter()
            .next()
            .expect("Gap buckets are never left empty");

        self.remove_gap(offset, gap_size);
        self.insert_gap(offset + job.size(), gap_size - job.size());
        self.free_memory -= job.size();

        debug!(
            "Placed job {} (size {}) on processor {} at offset {}",
            job.id(),
            job.size(),
            self.id,
            offset
        );
        job.place_at(offset);
        self.offsets.insert(job.id(), offset);
        self.jobs.insert(offset, job);
        Ok(offset)
    }

    /// Removes the job and frees its range as a new gap. Neighbouring gaps are not merged.
    ///
    /// # Panics
    ///
    /// If no job with `job_id` is placed on this processor.
    pub fn evict(&mut self, job_id: i32) -> Job {
        let offset = self.offsets.remove(&job_id).unwrap_or_else(|| {
            panic!(
                "Job {} does not exist on processor {}",
                job_id, self.id
            )
        });
        let job = self
            .jobs
            .remove(&offset)
            .expect("Offset index and placement table are out of sync");
        self.insert_gap(offset, job.size());
        self.free_memory += job.size();
        debug!(
            "Evicted job {} from processor {} at offset {}",
            job_id, self.id, offset
        );
        job
    }

    /// Ages every placed job by `time` and evicts the ones that finished.
    /// Returns the evicted jobs in ascending id order.
    pub fn advance_time(&mut self, time: i32) -> Vec<Job> {
        assert!(time > 0, "Time must advance by a positive amount. time: {}", time);
        let mut finished_ids = Vec::new();
        for job in self.jobs.values_mut() {
            job.advance(time);
            if job.is_finished() {
                finished_ids.push(job.id());
            }
        }
        finished_ids.sort_unstable();
        finished_ids
            .into_iter()
            .map(|job_id| self.evict(job_id))
            .collect()
    }

    /// Moves every job to the start of memory in ascending id order, leaving a single
    /// trailing gap (none when the memory is full).
    pub fn compact(&mut self) {
        let mut placed = std::mem::take(&mut self.jobs);
        let mut cursor = 0;
        for (&job_id, offset) in self.offsets.iter_mut() {
            let mut job = placed
                .remove(offset)
                .unwrap_or_else(|| panic!("Job {} lost during compaction", job_id));
            job.place_at(cursor);
            *offset = cursor;
            cursor += job.size();
            self.jobs.insert(*offset, job);
        }
        self.gaps.clear();
        self.insert_gap(cursor, self.capacity - cursor);
        debug!(
            "Compacted processor {}: {} jobs, trailing gap {}",
            self.id,
            self.jobs.len(),
            self.capacity - cursor
        );
    }

    /// One `<offset> <id> <size> <remaining_time>` line per job, in offset order.
    pub fn write_jobs<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for job in self.jobs.values() {
            job.write_placed_line(out)?;
        }
        Ok(())
    }
}
