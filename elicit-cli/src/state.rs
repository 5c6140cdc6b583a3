use anyhow::{Context, Result};
use elicit_core::{AssembledAnswers, InterviewSession};
use std::fs;
use std::path::{Path, PathBuf};

pub fn elicit_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".elicit"))
}

pub fn ensure_elicit_home() -> Result<PathBuf> {
    let dir = elicit_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn sessions_dir() -> Result<PathBuf> {
    let dir = ensure_elicit_home()?.join("sessions");
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn default_session_path(session_id: &str) -> Result<PathBuf> {
    Ok(sessions_dir()?.join(format!("{session_id}.json")))
}

/// `interview.json` -> `interview.answers.json`
pub fn answers_path(session_path: &Path) -> PathBuf {
    let stem = session_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    session_path.with_file_name(format!("{stem}.answers.json"))
}

/// Write via a sibling temp file so a crash never leaves a torn session.
pub fn save_session(path: &Path, session: &InterviewSession) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let json = session.to_json().context("serialize session")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

pub fn load_session(path: &Path) -> Result<InterviewSession> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    InterviewSession::from_json(&s).with_context(|| format!("parse session {}", path.display()))
}

pub fn write_answers(path: &Path, answers: &AssembledAnswers) -> Result<()> {
    let json = serde_json::to_string_pretty(answers)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use elicit_core::{GoalCatalog, InterviewSettings, SessionMeta, builtin_validators};

    fn session() -> InterviewSession {
        let registry = GoalCatalog::project_grant()
            .unwrap()
            .to_registry(builtin_validators())
            .unwrap();
        InterviewSession {
            meta: SessionMeta::new("project_grant"),
            settings: InterviewSettings::default(),
            registry,
            context: Default::default(),
        }
    }

    #[test]
    fn session_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("s1.json");
        let s = session();

        save_session(&p, &s).unwrap();
        assert!(!p.with_extension("json.tmp").exists());

        let back = load_session(&p).unwrap();
        assert_eq!(back.meta, s.meta);
        assert_eq!(back.registry.len(), 13);
        assert_eq!(back.context, s.context);
    }

    #[test]
    fn answers_sit_next_to_the_session() {
        assert_eq!(
            answers_path(Path::new("/tmp/x/interview.json")),
            PathBuf::from("/tmp/x/interview.answers.json")
        );
    }

    #[test]
    fn unreadable_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.json");
        fs::write(&p, "{ not json").unwrap();
        let err = load_session(&p).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }
}
