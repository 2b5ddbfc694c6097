use crate::error::Result;
use crate::storage::{PROFILE_SUFFIX, open_profile, schema_version};
use std::path::{Path, PathBuf};

/// Profile info extracted from a database file
pub struct ProfileInfo {
    pub path: PathBuf,
    pub product: String,
    pub threads: u64,
    pub samples: u64,
    pub duration_ms: f64,
    pub created: String,
}

/// Find all sampleview profile databases in a directory
pub fn find_profiles(dir: &Path) -> Result<Vec<ProfileInfo>> {
    let mut profiles = Vec::new();

    let entries = std::fs::read_dir(dir)?;
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str())
            && name.ends_with(PROFILE_SUFFIX)
        {
            match get_profile_info(&path) {
                Ok(info) => profiles.push(info),
                Err(e) => log::debug!("skipping {}: {e}", path.display()),
            }
        }
    }

    // Most recent first
    profiles.sort_by(|a, b| b.created.cmp(&a.created));

    Ok(profiles)
}

/// Get the most recent profile in a directory
pub fn most_recent_profile(dir: &Path) -> Result<Option<PathBuf>> {
    let profiles = find_profiles(dir)?;
    Ok(profiles.into_iter().next().map(|p| p.path))
}

/// Extract metadata from a profile database
fn get_profile_info(path: &Path) -> Result<ProfileInfo> {
    let conn = open_profile(path)?;
    if schema_version(&conn)?.is_none() {
        return Err(crate::Error::InvalidArgument(format!(
            "{} is not a profile database",
            path.display()
        )));
    }

    let meta = |key: &str| -> Option<String> {
        conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .ok()
    };

    let count = |sql: &str| -> u64 {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as u64
    };

    let duration_ms: f64 = conn
        .query_row(
            "SELECT COALESCE(MAX(time) - MIN(time), 0) FROM samples",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0.0);

    Ok(ProfileInfo {
        path: path.to_path_buf(),
        product: meta("product").unwrap_or_else(|| "unknown".to_string()),
        threads: count("SELECT COUNT(*) FROM threads"),
        samples: count("SELECT COUNT(*) FROM samples"),
        duration_ms,
        created: meta("created").unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Run the list command
pub fn run(dir: Option<&Path>) -> Result<()> {
    let search_dir = dir.unwrap_or_else(|| Path::new("."));
    let profiles = find_profiles(search_dir)?;

    if profiles.is_empty() {
        println!("No sampleview profiles found in {}", search_dir.display());
        return Ok(());
    }

    println!(
        "{:<40} {:>12} {:>8} {:>10} {:>10}",
        "FILE", "PRODUCT", "THREADS", "DURATION", "SAMPLES"
    );
    println!("{}", "-".repeat(84));

    for profile in profiles {
        let filename = profile
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        let secs = profile.duration_ms / 1000.0;
        let duration = if secs >= 60.0 {
            format!("{:.0}m{:.0}s", (secs / 60.0).floor(), secs % 60.0)
        } else {
            format!("{:.1}s", secs)
        };

        println!(
            "{:<40} {:>12} {:>8} {:>10} {:>10}",
            filename, profile.product, profile.threads, duration, profile.samples
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileBuilder, ThreadBuilder};
    use crate::storage::write_profile;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sampleview-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_only_profile_databases() {
        let dir = temp_dir("list");
        let profile = ProfileBuilder::new()
            .product("demo")
            .thread(ThreadBuilder::new("Main").sample(0.0, "A").sample(2.0, "A"))
            .build();
        write_profile(&dir.join("run.sampleview.db"), &profile).unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        std::fs::write(dir.join("bogus.sampleview.db"), "not sqlite").unwrap();

        let profiles = find_profiles(&dir).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].product, "demo");
        assert_eq!(profiles[0].threads, 1);
        assert_eq!(profiles[0].samples, 2);
        assert_eq!(profiles[0].duration_ms, 2.0);
        assert_eq!(
            most_recent_profile(&dir).unwrap(),
            Some(dir.join("run.sampleview.db"))
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
