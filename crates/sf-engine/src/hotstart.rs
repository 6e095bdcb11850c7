//! Hot-start snapshots: persist routing state and restore it later.
//!
//! A snapshot is a versioned little-endian binary file holding, for every
//! node, its depth, lateral inflow, ponded volume, and pollutant
//! concentrations, and for every link, its flow, depth, setting, and
//! pollutant concentrations. A topology hash (object counts plus routing
//! model) guards against loading a snapshot into a different network.
//! Writes go through a temp file renamed into place so a crash can never
//! leave a torn snapshot.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use sf_core::error::codes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use sf_project::Project;

const HOTSTART_MAGIC: &[u8; 4] = b"SFHS";
const HOTSTART_VERSION: u32 = 1;

pub type HotstartResult<T> = Result<T, HotstartError>;

#[derive(Error, Debug)]
pub enum HotstartError {
    #[error("Cannot open hot-start file: {0}")]
    Open(std::io::Error),

    #[error("Cannot write hot-start file: {0}")]
    Write(std::io::Error),

    #[error("Not a hot-start file")]
    Format,

    #[error("Unsupported hot-start file version {file} (current {current})")]
    Version { file: u32, current: u32 },

    #[error("Hot-start file topology does not match the open project")]
    Topology,
}

impl HotstartError {
    pub fn code(&self) -> u16 {
        match self {
            Self::Open(_) | Self::Format => codes::HOTSTART_OPEN,
            Self::Write(_) => codes::HOTSTART_WRITE,
            Self::Version { .. } => codes::HOTSTART_VERSION,
            Self::Topology => codes::HOTSTART_TOPOLOGY,
        }
    }
}

/// Hash of everything a snapshot must agree with the live project on.
pub fn topology_hash(project: &Project) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update((project.nodes.len() as u64).to_le_bytes());
    hasher.update((project.links.len() as u64).to_le_bytes());
    hasher.update((project.pollutants.len() as u64).to_le_bytes());
    hasher.update((project.options.routing_model as u8).to_le_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// Save the current routing state. Atomic: temp file + rename.
pub fn save(path: &Path, project: &Project, sim_time_ms: f64) -> HotstartResult<()> {
    let temp = path.with_extension("hsf.tmp");
    {
        let file = File::create(&temp).map_err(HotstartError::Write)?;
        let mut w = BufWriter::new(file);
        let put = |w: &mut BufWriter<File>, bytes: &[u8]| -> HotstartResult<()> {
            w.write_all(bytes).map_err(HotstartError::Write)
        };

        put(&mut w, HOTSTART_MAGIC)?;
        put(&mut w, &HOTSTART_VERSION.to_le_bytes())?;
        put(&mut w, &(project.options.routing_model as u32).to_le_bytes())?;
        put(&mut w, &topology_hash(project).to_le_bytes())?;
        put(&mut w, &sim_time_ms.to_le_bytes())?;
        put(&mut w, &(project.nodes.len() as u64).to_le_bytes())?;
        put(&mut w, &(project.links.len() as u64).to_le_bytes())?;
        put(&mut w, &(project.pollutants.len() as u64).to_le_bytes())?;

        for node in &project.nodes {
            put(&mut w, &node.depth.to_le_bytes())?;
            put(&mut w, &node.lateral_inflow.to_le_bytes())?;
            put(&mut w, &node.ponded_volume.to_le_bytes())?;
            for q in &node.qual {
                put(&mut w, &q.to_le_bytes())?;
            }
        }
        for link in &project.links {
            put(&mut w, &link.flow.to_le_bytes())?;
            put(&mut w, &link.depth.to_le_bytes())?;
            put(&mut w, &link.setting.to_le_bytes())?;
            for q in &link.qual {
                put(&mut w, &q.to_le_bytes())?;
            }
        }
        w.flush().map_err(HotstartError::Write)?;
    }
    std::fs::rename(&temp, path).map_err(HotstartError::Write)?;
    debug!(path = %path.display(), sim_time_ms, "hot-start snapshot saved");
    Ok(())
}

/// Check that a file is a loadable snapshot; returns its format version.
pub fn validate(path: &Path) -> HotstartResult<u32> {
    let file = File::open(path).map_err(HotstartError::Open)?;
    let mut r = BufReader::new(file);
    let mut magic = [0_u8; 4];
    r.read_exact(&mut magic).map_err(|_| HotstartError::Format)?;
    if &magic != HOTSTART_MAGIC {
        return Err(HotstartError::Format);
    }
    let version = read_u32(&mut r)?;
    if version != HOTSTART_VERSION {
        return Err(HotstartError::Version {
            file: version,
            current: HOTSTART_VERSION,
        });
    }
    Ok(version)
}

/// Restore routing state from a snapshot; the snapshot's topology hash
/// must match the open project. Returns the simulation time at which the
/// snapshot was taken, msec.
pub fn load(path: &Path, project: &mut Project) -> HotstartResult<f64> {
    validate(path)?;
    let file = File::open(path).map_err(HotstartError::Open)?;
    let mut r = BufReader::new(file);
    let mut magic = [0_u8; 4];
    r.read_exact(&mut magic).map_err(|_| HotstartError::Format)?;
    let _version = read_u32(&mut r)?;
    let _model = read_u32(&mut r)?;
    let hash = read_u64(&mut r)?;
    if hash != topology_hash(project) {
        return Err(HotstartError::Topology);
    }
    let sim_time_ms = read_f64(&mut r)?;
    let n_nodes = read_u64(&mut r)? as usize;
    let n_links = read_u64(&mut r)? as usize;
    let n_pollut = read_u64(&mut r)? as usize;
    if n_nodes != project.nodes.len()
        || n_links != project.links.len()
        || n_pollut != project.pollutants.len()
    {
        return Err(HotstartError::Topology);
    }

    for node in &mut project.nodes {
        node.depth = read_f64(&mut r)?;
        node.lateral_inflow = read_f64(&mut r)?;
        node.ponded_volume = read_f64(&mut r)?;
        for q in &mut node.qual {
            *q = read_f64(&mut r)?;
        }
    }
    for link in &mut project.links {
        link.flow = read_f64(&mut r)?;
        link.depth = read_f64(&mut r)?;
        link.setting = read_f64(&mut r)?;
        link.target_setting = link.setting;
        for q in &mut link.qual {
            *q = read_f64(&mut r)?;
        }
    }
    debug!(path = %path.display(), sim_time_ms, "hot-start snapshot loaded");
    Ok(sim_time_ms)
}

fn read_u32(r: &mut BufReader<File>) -> HotstartResult<u32> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf).map_err(|_| HotstartError::Format)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut BufReader<File>) -> HotstartResult<u64> {
    let mut buf = [0_u8; 8];
    r.read_exact(&mut buf).map_err(|_| HotstartError::Format)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(r: &mut BufReader<File>) -> HotstartResult<f64> {
    let mut buf = [0_u8; 8];
    r.read_exact(&mut buf).map_err(|_| HotstartError::Format)?;
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_project::schema::ProjectFile;

    fn network() -> Project {
        let file: ProjectFile = serde_yaml::from_str(
            r#"
nodes:
  - { type: junction, id: J1, invert: 10.0, max_depth: 6.0 }
  - { type: outfall, id: O1, invert: 0.0 }
links:
  - { type: conduit, id: C1, from: J1, to: O1, length: 400.0, roughness: 0.013, max_depth: 2.0 }
pollutants:
  - { id: TSS, init_concen: 5.0 }
"#,
        )
        .unwrap();
        let mut p = Project::from_schema(file).unwrap();
        p.init_state();
        p
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.hsf");

        let mut p = network();
        p.nodes[0].depth = 1.25;
        p.links[0].flow = 3.5;
        p.links[0].qual[0] = 7.0;
        save(&path, &p, 1_800_000.0).unwrap();

        let mut q = network();
        let t = load(&path, &mut q).unwrap();
        assert_eq!(t, 1_800_000.0);
        assert_eq!(q.nodes[0].depth, 1.25);
        assert_eq!(q.links[0].flow, 3.5);
        assert_eq!(q.links[0].qual[0], 7.0);
    }

    #[test]
    fn topology_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.hsf");
        let p = network();
        save(&path, &p, 0.0).unwrap();

        // a different network must refuse the snapshot
        let file: ProjectFile = serde_yaml::from_str(
            r#"
nodes:
  - { type: junction, id: J1, invert: 10.0 }
"#,
        )
        .unwrap();
        let mut other = Project::from_schema(file).unwrap();
        assert!(matches!(
            load(&path, &mut other),
            Err(HotstartError::Topology)
        ));
    }

    #[test]
    fn garbage_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.hsf");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(matches!(validate(&path), Err(HotstartError::Format)));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.hsf");
        save(&path, &network(), 0.0).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
