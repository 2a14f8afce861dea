//! Output artifacts of the two export stages.
//!
//! | artifact                      | writer                     |
//! |-------------------------------|----------------------------|
//! | `bim.json`                    | [`Forest::to_writer`]      |
//! | `bim_hierarchy.json`          | [`write_hierarchy`]        |
//! | `bim_hierarchy_excluded.json` | [`write_excluded`]         |

use serde::Serialize;
use std::{fs::File, io::BufWriter, io::Write, path::Path};

use crate::{
    config::ArtifactConfig,
    error::HierarchyError,
    forest::Forest,
    prune::{ExcludedIdSet, PruneOutcome, PrunedHierarchy},
};

pub const FOREST_FILE: &str = "bim.json";
pub const HIERARCHY_FILE: &str = "bim_hierarchy.json";
pub const EXCLUDED_FILE: &str = "bim_hierarchy_excluded.json";

fn write_json<T: Serialize, W: Write>(
    value: &T,
    writer: W,
    pretty: bool,
) -> Result<(), HierarchyError> {
    if pretty {
        serde_json::to_writer_pretty(writer, value)?;
    } else {
        serde_json::to_writer(writer, value)?;
    }
    Ok(())
}

/// A JSON object keyed by the top-level composite keys.
///
/// Serialization recurses once per hierarchy level, so a very deep hierarchy needs a
/// correspondingly large stack. `serde_json` also refuses to read back documents nested more
/// than 128 levels deep.
pub fn write_hierarchy<W: Write>(
    hierarchy: &PrunedHierarchy,
    writer: W,
    config: &ArtifactConfig,
) -> Result<(), HierarchyError> {
    write_json(hierarchy, writer, config.pretty)
}

/// A JSON array of string ids.
pub fn write_excluded<W: Write>(
    excluded: &ExcludedIdSet,
    writer: W,
    config: &ArtifactConfig,
) -> Result<(), HierarchyError> {
    write_json(excluded, writer, config.pretty)
}

fn create(dir: &Path, file_name: &str) -> Result<BufWriter<File>, HierarchyError> {
    let path = dir.join(file_name);
    tracing::debug!("Writing {:?}", path);
    Ok(BufWriter::new(File::create(path)?))
}

fn flush(mut writer: BufWriter<File>) -> Result<(), HierarchyError> {
    writer.flush()?;
    Ok(())
}

/// Write `bim.json` into `dir`.
pub fn write_forest_file(
    dir: &Path,
    forest: &Forest,
    config: &ArtifactConfig,
) -> Result<(), HierarchyError> {
    let mut writer = create(dir, FOREST_FILE)?;
    forest.to_writer(&mut writer, config.pretty)?;
    flush(writer)
}

/// Write `bim_hierarchy.json` and `bim_hierarchy_excluded.json` into `dir`.
pub fn write_outcome_files(
    dir: &Path,
    outcome: &PruneOutcome,
    config: &ArtifactConfig,
) -> Result<(), HierarchyError> {
    let mut writer = create(dir, HIERARCHY_FILE)?;
    write_hierarchy(&outcome.hierarchy, &mut writer, config)?;
    flush(writer)?;

    let mut writer = create(dir, EXCLUDED_FILE)?;
    write_excluded(&outcome.excluded, &mut writer, config)?;
    flush(writer)
}
