use crate::{ClipData, Project, ProjectError};
use sfx_decode::relative_to;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write `project` to `path`. Clip paths under the project's directory are
/// stored relative to it.
pub fn save_project(path: &Path, project: &Project) -> Result<(), ProjectError> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let project = Project {
        clips: project
            .clips
            .iter()
            .map(|clip| ClipData {
                path: relative_to(base, &clip.path),
                ..clip.clone()
            })
            .collect(),
        ..project.clone()
    };

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &project)?;

    Ok(())
}
