use std::fs;
use std::path::Path;

use usage_core::SessionFile;

use crate::types::Result;

const SESSIONS_DIR: &str = "sessions";

/// Lists every `<agent>/sessions/*.jsonl` file under the agents directory,
/// sorted by agent name and then by file name so sync order is stable.
///
/// A missing agents directory is not an error; there is simply nothing to
/// sync yet.
pub fn session_files(agents_dir: &Path) -> Result<Vec<SessionFile>> {
    let mut agents = Vec::new();
    let entries = match fs::read_dir(agents_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            agents.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    agents.sort();

    let mut files = Vec::new();
    for agent in agents {
        let sessions = agents_dir.join(&agent).join(SESSIONS_DIR);
        let entries = match fs::read_dir(&sessions) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") && entry.file_type()?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        files.extend(paths.into_iter().map(|path| SessionFile {
            agent_name: agent.clone(),
            path,
        }));
    }
    Ok(files)
}
