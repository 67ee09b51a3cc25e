use log::{info, warn};
use serde_derive::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::{cluster::Cluster, job::Job, processor::Processor};

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct JobLog {
    pub id: i32,
    pub offset: usize,
    pub size: usize,
    pub remaining_time: i32,
}

impl JobLog {
    pub fn new(job: &Job) -> Self {
        Self {
            id: job.id(),
            offset: job.offset().unwrap_or_default(),
            size: job.size(),
            remaining_time: job.remaining_time(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProcessorLog {
    pub id: String,
    pub capacity: usize,
    pub free_memory: usize,
    pub largest_gap: usize,
    pub jobs: Vec<JobLog>,
}

impl ProcessorLog {
    pub fn new(processor: &Processor) -> Self {
        Self {
            id: processor.id().clone(),
            capacity: processor.capacity(),
            free_memory: processor.free_memory(),
            largest_gap: processor.largest_gap(),
            jobs: processor.jobs().map(JobLog::new).collect(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ClusterLog {
    pub structure: String,
    pub processors: Vec<ProcessorLog>,
}

impl ClusterLog {
    pub fn new(cluster: &Cluster) -> Self {
        if !cluster.is_initialized() {
            return Self::default();
        }
        Self {
            structure: cluster.topology().format(),
            processors: cluster.processors().map(ProcessorLog::new).collect(),
        }
    }

    pub fn dump_cluster_log_to_yaml(&self, file_path: &str) {
        let yaml = serde_yaml::to_string(&self).expect("Failed to serialize ClusterLog to YAML");
        append_to_snapshot(file_path, &yaml);
    }
}

/// Creates (or truncates) `<dir_path>/<file_name>.yaml`, creating `dir_path` if needed.
/// Failures are logged; the path is returned either way.
pub fn create_snapshot_file(dir_path: &str, file_name: &str) -> String {
    let dir = Path::new(dir_path);
    if !dir.is_dir() {
        match fs::create_dir_all(dir) {
            Ok(()) => info!("Created snapshot directory {}", dir.display()),
            Err(err) => warn!("Cannot create snapshot directory {}: {}", dir.display(), err),
        }
    }
    let file_path = dir.join(format!("{}.yaml", file_name));
    if let Err(err) = File::create(&file_path) {
        warn!("Cannot create snapshot file {}: {}", file_path.display(), err);
    }
    file_path.to_string_lossy().into_owned()
}

fn append_to_snapshot(file_path: &str, yaml: &str) {
    let written = OpenOptions::new()
        .append(true)
        .create(true)
        .open(file_path)
        .and_then(|mut file| file.write_all(yaml.as_bytes()));
    if let Err(err) = written {
        warn!("Cannot write snapshot to {}: {}", file_path, err);
    }
}

pub fn dump_cluster_log_to_yaml(file_path: &str, cluster: &Cluster) {
    ClusterLog::new(cluster).dump_cluster_log_to_yaml(file_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TokenReader;
    use std::fs::remove_file;

    fn create_cluster() -> Cluster {
        let mut cluster = Cluster::new();
        cluster
            .read(&mut TokenReader::new("A 100 B 50 * * *".as_bytes()))
            .unwrap();
        cluster.place_job("A", Job::new(1, 40, 5)).unwrap();
        cluster.place_job("A", Job::new(2, 30, 7)).unwrap();
        cluster.remove_job("A", 1);
        cluster
    }

    fn test_folder() -> String {
        std::env::temp_dir()
            .join("cluster_sim_tests")
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_dump_cluster_log_to_yaml_normal() {
        let file_path =
            create_snapshot_file(&test_folder(), "test_dump_cluster_log_to_yaml_normal");
        dump_cluster_log_to_yaml(&file_path, &create_cluster());

        let file_contents = std::fs::read_to_string(&file_path).unwrap();
        let cluster_log: ClusterLog = serde_yaml::from_str(&file_contents).unwrap();

        assert_eq!(cluster_log.structure, "(A(B  ) )");
        assert_eq!(cluster_log.processors.len(), 2);
        let first = &cluster_log.processors[0];
        assert_eq!(first.id, "A");
        assert_eq!(first.free_memory, 70);
        assert_eq!(first.largest_gap, 40);
        assert_eq!(first.jobs.len(), 1);
        assert_eq!(first.jobs[0].id, 2);
        assert_eq!(first.jobs[0].offset, 40);
        assert_eq!(first.jobs[0].remaining_time, 7);
        assert!(cluster_log.processors[1].jobs.is_empty());
        remove_file(file_path).unwrap();
    }

    #[test]
    fn test_create_snapshot_file_creates_directory() {
        let dir_path = format!("{}/nested_snapshot_dir", test_folder());
        let _ = std::fs::remove_dir_all(&dir_path);
        let file_path = create_snapshot_file(&dir_path, "snapshot");
        assert!(file_path.ends_with("snapshot.yaml"));
        assert!(Path::new(&file_path).is_file());
        std::fs::remove_dir_all(&dir_path).unwrap();
    }

    #[test]
    fn test_cluster_log_uninitialized() {
        let cluster_log = ClusterLog::new(&Cluster::new());
        assert!(cluster_log.structure.is_empty());
        assert!(cluster_log.processors.is_empty());
    }
}
