//! Read-only project health report (SPEC_FULL.md supplement B), grounded
//! in the teacher's `plugins/doctor.rs` preflight-check pattern: a fixed
//! list of checks, each either pass/fail/warn, rolled up into one report.

use crate::core::error::CyberismoError;
use crate::core::paths;
use crate::project::Project;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

/// Run every preflight check against an already-open project and roll the
/// results up into one report. Never mutates the project.
pub fn run(project: &mut Project) -> Result<DoctorReport, CyberismoError> {
    let mut checks = Vec::new();
    checks.push(check_versions(project));
    checks.push(check_lock_file(project));
    checks.push(check_migration_log(project));
    checks.push(check_card_count(project));
    checks.push(check_resource_count(project));
    checks.push(check_validate(project));

    let passed = checks.iter().filter(|c| c.status == CheckStatus::Pass).count();
    let failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warn).count();
    Ok(DoctorReport { checks, passed, failed, warnings })
}

fn check_versions(project: &Project) -> CheckResult {
    let published = project.published_version();
    let draft = project.draft_version();
    CheckResult {
        name: "versions".into(),
        status: CheckStatus::Pass,
        message: format!("published v{published}, draft v{draft}"),
    }
}

fn check_lock_file(project: &Project) -> CheckResult {
    let path = paths::lock_path(&project.root);
    if path.exists() {
        CheckResult {
            name: "advisory-lock".into(),
            status: CheckStatus::Pass,
            message: "held for this process".into(),
        }
    } else {
        CheckResult {
            name: "advisory-lock".into(),
            status: CheckStatus::Warn,
            message: "no advisory lock file found; project may have been opened without locking".into(),
        }
    }
}

fn check_migration_log(project: &Project) -> CheckResult {
    match crate::migration_log::read_all(&project.root, project.draft_version()) {
        Ok(entries) if entries.is_empty() => {
            CheckResult { name: "migration-log".into(), status: CheckStatus::Pass, message: "no pending changes in the draft".into() }
        }
        Ok(entries) => CheckResult {
            name: "migration-log".into(),
            status: CheckStatus::Pass,
            message: format!("{} pending change(s) in the draft", entries.len()),
        },
        Err(e) => CheckResult { name: "migration-log".into(), status: CheckStatus::Fail, message: e.to_string() },
    }
}

fn check_card_count(project: &Project) -> CheckResult {
    let count = project.cards.get_project_cards().len();
    CheckResult { name: "cards".into(), status: CheckStatus::Pass, message: format!("{count} project card(s)") }
}

fn check_resource_count(project: &Project) -> CheckResult {
    let count = project
        .resources
        .registry_entries()
        .filter(|e| e.source == crate::cache::ResourceSource::Local)
        .count();
    let modules = project.config.modules.len();
    CheckResult {
        name: "resources".into(),
        status: CheckStatus::Pass,
        message: format!("{count} local resource(s), {modules} imported module(s)"),
    }
}

fn check_validate(project: &mut Project) -> CheckResult {
    match crate::commands::resource_ops::validate(project) {
        Ok(problems) if problems.is_empty() => {
            CheckResult { name: "validate".into(), status: CheckStatus::Pass, message: "no schema or reference problems".into() }
        }
        Ok(problems) => CheckResult {
            name: "validate".into(),
            status: CheckStatus::Fail,
            message: crate::core::output::preview_messages(&problems, 5, 80),
        },
        Err(e) => CheckResult { name: "validate".into(), status: CheckStatus::Fail, message: e.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_project_reports_clean() {
        let dir = tempdir().unwrap();
        let mut project = Project::init(dir.path(), "Decision Records", "dec").unwrap();
        let report = run(&mut project).unwrap();
        assert_eq!(report.failed, 0);
        assert!(report.checks.iter().any(|c| c.name == "cards"));
    }
}
