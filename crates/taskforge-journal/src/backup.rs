use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// How many rolling backups to keep (spec.md §4.B).
const MAX_BACKUPS: usize = 10;

/// Copy `source` into `state_dir/backups/state-backup-<ISO timestamp>`, then
/// prune down to the newest [`MAX_BACKUPS`].
///
/// Colons in the ISO-8601 timestamp are replaced with dashes so the filename
/// is valid on filesystems that reject `:` (notably anything NTFS-adjacent).
pub fn write_backup(state_dir: &Path, source: &Path) -> std::io::Result<PathBuf> {
    let backups_dir = state_dir.join("backups");
    fs::create_dir_all(&backups_dir)?;

    let stamp = Utc::now().to_rfc3339().replace(':', "-");
    let dest = backups_dir.join(format!("state-backup-{stamp}"));
    fs::copy(source, &dest)?;

    prune(&backups_dir)?;
    Ok(dest)
}

fn prune(backups_dir: &Path) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(backups_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("state-backup-"))
                .unwrap_or(false)
        })
        .collect();
    // Lexicographic order matches chronological order for RFC3339 timestamps.
    entries.sort();

    if entries.len() > MAX_BACKUPS {
        for stale in &entries[..entries.len() - MAX_BACKUPS] {
            fs::remove_file(stale)?;
        }
    }
    Ok(())
}

/// List backup files, newest last.
pub fn list_backups(state_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let backups_dir = state_dir.join("backups");
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(&backups_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("state-backup-"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_is_created_and_listed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("project-state.json");
        fs::write(&src, "{}").unwrap();

        write_backup(dir.path(), &src).unwrap();
        let backups = list_backups(dir.path()).unwrap();
        assert_eq!(backups.len(), 1);
        assert!(backups[0]
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("state-backup-"));
    }

    #[test]
    fn prunes_to_ten_newest() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("project-state.json");
        for i in 0..13 {
            fs::write(&src, format!("{{\"n\":{i}}}")).unwrap();
            write_backup(dir.path(), &src).unwrap();
        }
        let backups = list_backups(dir.path()).unwrap();
        assert_eq!(backups.len(), MAX_BACKUPS);
    }
}
