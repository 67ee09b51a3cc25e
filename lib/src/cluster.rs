//! Cluster of processors arranged as a binary tree.
//!
//! The tree shape lives in a [`Topology`] and the processors in a registry keyed by id.
//! Both always hold exactly the same set of ids once the cluster has been read.
use crate::{
    job::Job,
    processor::{PlacementError, Processor},
    reader::{ReadError, TokenReader},
    topology::{Side, Topology},
};
use log::{debug, info};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

const EMPTY_SUBTREE_TOKEN: &str = "*";

#[derive(Debug, Clone, Default)]
pub struct Cluster {
    topology: Option<Topology>,
    processors: BTreeMap<String, Processor>,
}

impl Cluster {
    /// An uninitialized cluster. Only [`Cluster::read`] or [`Cluster::with_root`] make it usable.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(id: &str, capacity: usize) -> Self {
        Self {
            topology: Some(Topology::new(id)),
            processors: BTreeMap::from([(id.to_string(), Processor::new(id, capacity))]),
        }
    }

    /// Adds a processor as the `side` auxiliary of `parent_id`.
    pub fn add_processor(&mut self, parent_id: &str, side: Side, id: &str, capacity: usize) {
        let topology = self
            .topology
            .as_mut()
            .expect("The cluster has not been initialized");
        let parent = topology
            .find(parent_id)
            .unwrap_or_else(|| panic!("Processor {} does not exist", parent_id));
        topology.add_child(parent, side, id);
        self.processors
            .insert(id.to_string(), Processor::new(id, capacity));
    }

    /// Replaces the whole cluster with the one described in pre-order by `reader`:
    /// `<id> <capacity> <left> <right>`, an empty subtree being `*`.
    pub fn read<R: BufRead>(&mut self, reader: &mut TokenReader<R>) -> Result<(), ReadError> {
        let root_id = reader.expect_token("processor id")?;
        if root_id == EMPTY_SUBTREE_TOKEN {
            return Err(ReadError::Parse {
                token: root_id,
                expected: "root processor id",
            });
        }
        let capacity = Self::read_capacity(reader)?;
        let mut cluster = Cluster::with_root(&root_id, capacity);
        let root = cluster.topology().root();
        cluster.read_subtree(reader, root, Side::Left)?;
        cluster.read_subtree(reader, root, Side::Right)?;

        info!(
            "Configured cluster with {} processors",
            cluster.processors.len()
        );
        *self = cluster;
        Ok(())
    }

    fn read_capacity<R: BufRead>(reader: &mut TokenReader<R>) -> Result<usize, ReadError> {
        let capacity: usize = reader.read("processor capacity")?;
        if capacity == 0 {
            return Err(ReadError::Parse {
                token: capacity.to_string(),
                expected: "positive processor capacity",
            });
        }
        Ok(capacity)
    }

    fn read_subtree<R: BufRead>(
        &mut self,
        reader: &mut TokenReader<R>,
        parent: usize,
        side: Side,
    ) -> Result<(), ReadError> {
        let id = reader.expect_token("processor id")?;
        if id == EMPTY_SUBTREE_TOKEN {
            return Ok(());
        }
        if self.processors.contains_key(&id) {
            return Err(ReadError::Parse {
                token: id,
                expected: "unique processor id",
            });
        }
        let capacity = Self::read_capacity(reader)?;
        let parent_id = self.topology().node(parent).id.clone();
        self.add_processor(&parent_id, side, &id, capacity);
        let node_i = self
            .topology()
            .find(&id)
            .expect("The processor has just been added");
        self.read_subtree(reader, node_i, Side::Left)?;
        self.read_subtree(reader, node_i, Side::Right)
    }

    pub fn is_initialized(&self) -> bool {
        self.topology.is_some()
    }

    pub fn topology(&self) -> &Topology {
        self.topology
            .as_ref()
            .expect("The cluster has not been initialized")
    }

    pub fn exists(&self, id: &str) -> bool {
        self.processors.contains_key(id)
    }

    pub fn has_auxiliary(&self, id: &str) -> bool {
        self.topology().has_auxiliary(id)
    }

    pub fn processor(&self, id: &str) -> Option<&Processor> {
        self.processors.get(id)
    }

    fn processor_mut(&mut self, id: &str) -> &mut Processor {
        self.processors
            .get_mut(id)
            .unwrap_or_else(|| panic!("Processor {} does not exist", id))
    }

    /// Processor ids in pre-order.
    pub fn processor_ids(&self) -> Vec<String> {
        self.topology().ids()
    }

    /// Processors in pre-order.
    pub fn processors(&self) -> impl Iterator<Item = &Processor> {
        self.processor_ids()
            .into_iter()
            .map(move |id| &self.processors[&id])
    }

    pub fn place_job(&mut self, processor_id: &str, job: Job) -> Result<usize, PlacementError> {
        self.processor_mut(processor_id).place(job)
    }

    pub fn remove_job(&mut self, processor_id: &str, job_id: i32) -> Job {
        self.processor_mut(processor_id).evict(job_id)
    }

    /// Ages every processor in the registry, independently of its position in the tree.
    pub fn advance_time(&mut self, time: i32) {
        assert!(self.is_initialized(), "The cluster has not been initialized");
        let finished: usize = self
            .processors
            .values_mut()
            .map(|processor| processor.advance_time(time).len())
            .sum();
        debug!("Advanced time by {}: {} jobs finished", time, finished);
    }

    pub fn compact_processor(&mut self, id: &str) {
        self.processor_mut(id).compact();
    }

    pub fn compact_all(&mut self) {
        assert!(self.is_initialized(), "The cluster has not been initialized");
        for processor in self.processors.values_mut() {
            processor.compact();
        }
    }

    /// Ids of `other` that would clash with processors kept after grafting it at `at_id`.
    pub fn graft_conflicts(&self, other: &Cluster, at_id: &str) -> Vec<String> {
        let replaced = self.topology().subtree_ids(at_id);
        other
            .processors
            .keys()
            .filter(|id| self.exists(id) && !replaced.contains(id))
            .cloned()
            .collect()
    }

    /// Replaces the subtree at `at_id` with the whole of `other`.
    ///
    /// Processors of the replaced subtree that `other` does not bring back are dropped
    /// from the registry, so the registry keeps matching the tree.
    pub fn graft(&mut self, other: Cluster, at_id: &str) {
        let conflicts = self.graft_conflicts(&other, at_id);
        assert!(
            conflicts.is_empty(),
            "Grafted processors already exist in the cluster: {:?}",
            conflicts
        );
        let other_topology = other
            .topology
            .expect("Cannot graft an uninitialized cluster");

        let topology = self
            .topology
            .as_mut()
            .expect("The cluster has not been initialized");
        let detached = topology.graft(at_id, &other_topology);
        for id in &detached {
            self.processors.remove(id);
        }
        let grafted = other.processors.len();
        self.processors.extend(other.processors);
        info!(
            "Grafted {} processors at {}, dropped {:?}",
            grafted, at_id, detached
        );
    }

    /// Places a job coming from the waiting area on the processor whose best-fit gap is the
    /// tightest; ties go to the most free memory, then the shallowest, then the leftmost node.
    /// Hands the job back when no processor can take it.
    pub fn place_queued_job(&mut self, job: Job) -> Result<String, Job> {
        let topology = self.topology();
        let mut best: Option<((usize, Reverse<usize>, usize), &str)> = None;
        for (node_i, depth) in topology.level_order() {
            let id = topology.node(node_i).id.as_str();
            let processor = &self.processors[id];
            if processor.exists(job.id()) {
                continue;
            }
            if let Some(gap) = processor.best_fit_gap(job.size()) {
                let key = (gap, Reverse(processor.free_memory()), depth);
                if best.map_or(true, |(best_key, _)| key < best_key) {
                    best = Some((key, id));
                }
            }
        }

        match best.map(|(_, id)| id.to_string()) {
            Some(id) => {
                self.processor_mut(&id)
                    .place(job)
                    .expect("The chosen processor has a gap large enough");
                Ok(id)
            }
            None => Err(job),
        }
    }

    pub fn write_processor<W: Write>(&self, id: &str, out: &mut W) -> io::Result<()> {
        self.processors
            .get(id)
            .unwrap_or_else(|| panic!("Processor {} does not exist", id))
            .write_jobs(out)
    }

    pub fn write_processors<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for processor in self.processors() {
            writeln!(out, "{}", processor.id())?;
            processor.write_jobs(out)?;
        }
        Ok(())
    }

    pub fn write_structure<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.topology().format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_job(id: i32, size: usize, remaining_time: i32) -> Job {
        Job::new(id, size, remaining_time)
    }

    fn read_cluster(input: &str) -> Cluster {
        let mut cluster = Cluster::new();
        cluster
            .read(&mut TokenReader::new(input.as_bytes()))
            .unwrap();
        cluster
    }

    fn assert_registry_matches_tree(cluster: &Cluster) {
        let mut tree_ids = cluster.processor_ids();
        tree_ids.sort();
        let registry_ids: Vec<String> = cluster.processors.keys().cloned().collect();
        assert_eq!(tree_ids, registry_ids);
        assert!(!cluster.topology().is_empty());
    }

    #[test]
    fn test_cluster_new_uninitialized() {
        let cluster = Cluster::new();
        assert!(!cluster.is_initialized());
        assert!(!cluster.exists("A"));
    }

    #[test]
    fn test_cluster_read_normal() {
        let cluster = read_cluster("A 100 B 50 * * C 70 * D 20 * *");
        assert!(cluster.is_initialized());
        assert_eq!(cluster.processor_ids(), vec!["A", "B", "C", "D"]);
        assert!(cluster.has_auxiliary("A"));
        assert!(!cluster.has_auxiliary("B"));
        assert!(cluster.has_auxiliary("C"));
        assert_eq!(cluster.processor("C").unwrap().capacity(), 70);
        assert_registry_matches_tree(&cluster);

        let mut out = Vec::new();
        cluster.write_structure(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "(A(B  )(C (D  )))\n");
    }

    #[test]
    fn test_cluster_read_replaces_previous() {
        let mut cluster = read_cluster("A 100 * *");
        cluster.place_job("A", create_job(1, 10, 5)).unwrap();
        cluster
            .read(&mut TokenReader::new("X 10 * *".as_bytes()))
            .unwrap();
        assert_eq!(cluster.processor_ids(), vec!["X"]);
        assert!(!cluster.exists("A"));
    }

    #[test]
    fn test_cluster_read_empty_root() {
        let mut cluster = Cluster::new();
        assert!(cluster
            .read(&mut TokenReader::new("*".as_bytes()))
            .is_err());
        assert!(!cluster.is_initialized());
    }

    #[test]
    fn test_cluster_read_duplicate_id() {
        let mut cluster = Cluster::new();
        let result = cluster.read(&mut TokenReader::new("A 10 A 10 * * *".as_bytes()));
        assert!(matches!(result, Err(ReadError::Parse { .. })));
    }

    #[test]
    fn test_cluster_place_and_remove_job() {
        let mut cluster = read_cluster("A 100 B 50 * * *");
        assert_eq!(cluster.place_job("B", create_job(1, 30, 5)), Ok(0));
        assert!(cluster.processor("B").unwrap().exists(1));
        assert!(cluster.place_job("B", create_job(2, 30, 5)).is_err());
        let job = cluster.remove_job("B", 1);
        assert_eq!(job.size(), 30);
        assert!(!cluster.processor("B").unwrap().is_active());
    }

    #[test]
    #[should_panic]
    fn test_cluster_place_job_no_exist_processor() {
        let mut cluster = read_cluster("A 100 * *");
        let _ = cluster.place_job("Z", create_job(1, 30, 5));
    }

    #[test]
    fn test_cluster_advance_time_all_processors() {
        let mut cluster = read_cluster("A 100 B 50 * * C 50 * *");
        cluster.place_job("A", create_job(1, 10, 5)).unwrap();
        cluster.place_job("B", create_job(1, 10, 6)).unwrap();
        cluster.place_job("C", create_job(2, 10, 2)).unwrap();
        cluster.advance_time(5);
        assert!(!cluster.processor("A").unwrap().exists(1));
        assert_eq!(
            cluster.processor("B").unwrap().job(1).unwrap().remaining_time(),
            1
        );
        assert!(!cluster.processor("C").unwrap().is_active());
    }

    #[test]
    fn test_cluster_compact_all() {
        let mut cluster = read_cluster("A 100 B 50 * * *");
        for (id, size) in [(1, 10), (2, 20), (3, 5)] {
            cluster.place_job("A", create_job(id, size, 5)).unwrap();
            cluster.place_job("B", create_job(id, size, 5)).unwrap();
        }
        cluster.remove_job("A", 2);
        cluster.remove_job("B", 1);
        cluster.compact_all();
        assert_eq!(cluster.processor("A").unwrap().gaps(), vec![(15, 85)]);
        assert_eq!(cluster.processor("B").unwrap().gaps(), vec![(25, 25)]);
    }

    #[test]
    fn test_cluster_compact_processor_only_target() {
        let mut cluster = read_cluster("A 100 B 50 * * *");
        for id in 0..3 {
            cluster.place_job("A", create_job(id, 10, 5)).unwrap();
            cluster.place_job("B", create_job(id, 10, 5)).unwrap();
        }
        cluster.remove_job("A", 0);
        cluster.remove_job("B", 0);
        cluster.compact_processor("A");
        assert_eq!(cluster.processor("A").unwrap().gaps(), vec![(20, 80)]);
        assert_eq!(cluster.processor("B").unwrap().gaps(), vec![(0, 10), (30, 20)]);
    }

    #[test]
    fn test_cluster_graft_leaf() {
        let mut cluster = read_cluster("A 100 B 50 * * C 50 * *");
        let other = read_cluster("X 10 Y 20 * * *");
        assert!(cluster.graft_conflicts(&other, "B").is_empty());

        cluster.graft(other, "B");
        assert_eq!(cluster.processor_ids(), vec!["A", "X", "Y", "C"]);
        assert!(!cluster.exists("B"));
        assert_eq!(cluster.processor("Y").unwrap().capacity(), 20);
        assert_registry_matches_tree(&cluster);
    }

    #[test]
    fn test_cluster_graft_inner_node() {
        let mut cluster = read_cluster("A 100 B 50 D 10 * * E 10 * * C 50 * *");
        cluster.place_job("D", create_job(1, 5, 5)).unwrap();
        let other = read_cluster("X 10 * *");
        assert!(cluster.graft_conflicts(&other, "B").is_empty());

        cluster.graft(other, "B");
        assert_eq!(cluster.processor_ids(), vec!["A", "X", "C"]);
        for id in ["B", "D", "E"] {
            assert!(!cluster.exists(id));
            assert!(cluster.processor(id).is_none());
        }
        assert_registry_matches_tree(&cluster);
    }

    #[test]
    #[should_panic]
    fn test_cluster_compact_all_uninitialized() {
        Cluster::new().compact_all();
    }

    #[test]
    fn test_cluster_graft_reintroduces_replaced_id() {
        let mut cluster = read_cluster("A 100 B 50 * * *");
        cluster.place_job("B", create_job(1, 10, 5)).unwrap();
        let other = read_cluster("B 10 * *");
        assert!(cluster.graft_conflicts(&other, "B").is_empty());

        cluster.graft(other, "B");
        let processor = cluster.processor("B").unwrap();
        assert_eq!(processor.capacity(), 10);
        assert!(!processor.is_active());
        assert_registry_matches_tree(&cluster);
    }

    #[test]
    fn test_cluster_graft_conflicts() {
        let cluster = read_cluster("A 100 B 50 * * C 50 * *");
        let other = read_cluster("X 10 C 20 * * A 5 * *");
        assert_eq!(cluster.graft_conflicts(&other, "B"), vec!["A", "C"]);
    }

    #[test]
    #[should_panic]
    fn test_cluster_graft_conflicting_ids() {
        let mut cluster = read_cluster("A 100 B 50 * * C 50 * *");
        let other = read_cluster("C 10 * *");
        cluster.graft(other, "B");
    }

    #[test]
    fn test_cluster_place_queued_job_tightest_gap() {
        let mut cluster = read_cluster("A 100 B 50 * * C 40 * *");
        assert_eq!(cluster.place_queued_job(create_job(1, 30, 5)), Ok("C".to_string()));
        // gaps: A 100, B 50, C 10
        assert_eq!(cluster.place_queued_job(create_job(2, 45, 5)), Ok("B".to_string()));
        assert_eq!(cluster.place_queued_job(create_job(3, 60, 5)), Ok("A".to_string()));
    }

    #[test]
    fn test_cluster_place_queued_job_tie_breaks() {
        // Equal gaps and free memory: shallowest wins, then leftmost.
        let mut cluster = read_cluster("A 50 B 50 D 50 * * * C 50 * *");
        for expected in ["A", "B", "C", "D"] {
            assert_eq!(
                cluster.place_queued_job(create_job(1, 10, 5)),
                Ok(expected.to_string())
            );
        }
        assert!(cluster.place_queued_job(create_job(1, 10, 5)).is_err());
    }

    #[test]
    fn test_cluster_place_queued_job_more_free_memory() {
        let mut cluster = read_cluster("A 100 B 100 * * *");
        // A: gaps 20@0 and 60@40 (free 80); B: gap 20@80 (free 20)
        cluster.place_job("A", create_job(1, 20, 5)).unwrap();
        cluster.place_job("A", create_job(2, 20, 5)).unwrap();
        cluster.remove_job("A", 1);
        cluster.place_job("B", create_job(3, 80, 5)).unwrap();
        assert_eq!(cluster.place_queued_job(create_job(4, 20, 5)), Ok("A".to_string()));
        assert_eq!(cluster.processor("A").unwrap().job(4).unwrap().offset(), Some(0));
    }

    #[test]
    fn test_cluster_place_queued_job_rejected() {
        let mut cluster = read_cluster("A 10 * *");
        cluster.place_job("A", create_job(1, 5, 5)).unwrap();
        let rejected = cluster.place_queued_job(create_job(1, 5, 5)).unwrap_err();
        assert_eq!(rejected.id(), 1);
        assert!(cluster.place_queued_job(create_job(2, 6, 5)).is_err());
    }

    #[test]
    fn test_cluster_write_processors_pre_order() {
        let mut cluster = read_cluster("B 100 C 50 * * A 50 * *");
        cluster.place_job("A", create_job(4, 10, 3)).unwrap();
        cluster.place_job("B", create_job(7, 20, 9)).unwrap();
        let mut out = Vec::new();
        cluster.write_processors(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "B\n0 7 20 9\nC\nA\n0 4 10 3\n"
        );
    }
}
