//! Exercise file identity within the quest corpus.

use std::{
    fs,
    path::{Component, Path, PathBuf}
};

use crate::error::{AppResult, file_read_error};

/// One exercise script, located relative to the quests root.
///
/// The corpus is laid out as `<quests_root>/<quest>/<subdirs...>/<file>.sql`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseFile {
    pub path:            PathBuf,
    pub quest:           String,
    pub relative_subdir: PathBuf,
    pub stem:            String
}

impl ExerciseFile {
    /// Derive quest and subdirectory from the file's position under
    /// `quests_root`. Files outside the root use their parent directory as
    /// the quest.
    pub fn locate(path: &Path, quests_root: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let relative = relative_to(path, quests_root);
        let dirs: Vec<String> = match &relative {
            Some(rel) => rel
                .parent()
                .map(|p| {
                    p.components()
                        .filter_map(|c| match c {
                            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                            _ => None
                        })
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new()
        };

        let (quest, relative_subdir) = match dirs.split_first() {
            Some((quest, rest)) => (quest.clone(), rest.iter().collect::<PathBuf>()),
            None => (parent_name(path), PathBuf::new())
        };

        Self {
            path: path.to_path_buf(),
            quest,
            relative_subdir,
            stem
        }
    }

    /// File name including extension.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Deterministic report location under `output_root`.
    pub fn report_path(&self, output_root: &Path) -> PathBuf {
        output_root
            .join(&self.quest)
            .join(&self.relative_subdir)
            .join(format!("{}.json", self.stem))
    }

    /// Exercise text.
    pub fn read(&self) -> AppResult<String> {
        fs::read_to_string(&self.path).map_err(|e| file_read_error(&self.path.display().to_string(), e))
    }
}

fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }
    let path = fs::canonicalize(path).ok()?;
    let root = fs::canonicalize(root).ok()?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
