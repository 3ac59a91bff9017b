// titrate-eval: Trace Analysis for the Titrate Buffer-Management Evaluation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Utility module collection of functions

use std::path::{Path, PathBuf};

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Files in `dir` matching `pattern`, in human order (`run2` before `run10`).
pub fn glob_traces(
    dir: impl AsRef<Path>,
    pattern: &str,
) -> Result<Vec<PathBuf>, glob::PatternError> {
    let full = dir.as_ref().join(pattern);
    let mut paths: Vec<PathBuf> = glob::glob(&full.to_string_lossy())?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path: {e}");
                None
            }
        })
        .collect();
    paths.sort_by(|a, b| human_sort::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(paths)
}

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }
}
