//! Edit session manager (spec §4.7, optional subsystem): git-worktree-backed
//! draft sessions for a single card. Only available when the project root
//! is itself a git repository — commands that need one open it lazily via
//! `git2::Repository::open`, the same crate `resource_ops::import_module`
//! already uses for module cloning.

use crate::core::error::CyberismoError;
use crate::core::paths;
use crate::project::Project;
use git2::{BranchType, Repository, StatusOptions, WorktreeAddOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSession {
    pub id: String,
    pub card_key: String,
    pub branch: String,
    pub worktree_path: PathBuf,
}

fn open_repo(project_root: &Path) -> Result<Repository, CyberismoError> {
    Repository::open(project_root)
        .map_err(|e| CyberismoError::InvariantViolation(format!("project is not a git repository: {e}")))
}

fn signature() -> Result<git2::Signature<'static>, CyberismoError> {
    git2::Signature::now("cyberismo", "cyberismo@local")
        .map_err(|e| CyberismoError::InvariantViolation(format!("could not build a commit signature: {e}")))
}

fn refuse_if_dirty(repo: &Repository) -> Result<(), CyberismoError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true);
    let statuses = repo
        .statuses(Some(&mut opts))
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    if !statuses.is_empty() {
        return Err(CyberismoError::Conflict(
            "cannot start an edit session while the main worktree has uncommitted changes".into(),
        ));
    }
    Ok(())
}

/// `startSession(cardKey)`: create a worktree at
/// `.cards/edit-sessions/<uuid>` on a new `edit/<cardKey>/<uuid>` branch
/// taken from the current HEAD commit. Refuses on a dirty main worktree.
pub fn start_session(project: &Project, card_key: &str) -> Result<EditSession, CyberismoError> {
    if !project.cards.has_card(card_key) {
        return Err(CyberismoError::NotFound(format!("card '{card_key}'")));
    }
    let repo = open_repo(&project.root)?;
    refuse_if_dirty(&repo)?;

    let id = crate::core::time::new_uuid_v4();
    let branch_name = format!("edit/{card_key}/{id}");
    let head_commit = repo
        .head()
        .and_then(|head| head.peel_to_commit())
        .map_err(|e| CyberismoError::InvariantViolation(format!("repository has no HEAD commit: {e}")))?;
    repo.branch(&branch_name, &head_commit, false)
        .map_err(|e| CyberismoError::Conflict(format!("branch '{branch_name}' already exists: {e}")))?;
    let branch_ref = repo
        .find_branch(&branch_name, BranchType::Local)
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?
        .into_reference();

    let worktree_path = paths::edit_session_path(&project.root, &id);
    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CyberismoError::filesystem(parent, e))?;
    }
    let mut opts = WorktreeAddOptions::new();
    opts.reference(Some(&branch_ref));
    repo.worktree(&id, &worktree_path, Some(&opts))
        .map_err(|e| CyberismoError::InvariantViolation(format!("could not create worktree: {e}")))?;

    Ok(EditSession { id, card_key: card_key.to_string(), branch: branch_name, worktree_path })
}

/// `saveSession(id)`: stage and commit every pending change in the
/// session's worktree. A no-op (returns `Ok(false)`) if nothing changed.
pub fn save_session(project_root: &Path, session_id: &str) -> Result<bool, CyberismoError> {
    let worktree_path = paths::edit_session_path(project_root, session_id);
    let repo = Repository::open(&worktree_path)
        .map_err(|e| CyberismoError::NotFound(format!("edit session '{session_id}': {e}")))?;

    let mut index = repo.index().map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    index
        .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    index.write().map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;

    let parent = repo
        .head()
        .and_then(|head| head.peel_to_commit())
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    let tree_id = index.write_tree().map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    if tree_id == parent.tree_id() {
        return Ok(false);
    }
    let tree = repo.find_tree(tree_id).map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    let sig = signature()?;
    repo.commit(Some("HEAD"), &sig, &sig, &format!("edit session {session_id}"), &tree, &[&parent])
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    Ok(true)
}

/// `publishSession(id)`: auto-save, fast-forward the branch the session
/// started from onto the session's tip, then remove the worktree and
/// branch. Refuses (without losing work) if the main branch has moved on
/// since the session started, since conflict resolution is out of scope.
pub fn publish_session(project: &mut Project, session_id: &str) -> Result<(), CyberismoError> {
    save_session(&project.root, session_id)?;

    let worktree_path = paths::edit_session_path(&project.root, session_id);
    let session_repo = Repository::open(&worktree_path)
        .map_err(|e| CyberismoError::NotFound(format!("edit session '{session_id}': {e}")))?;
    let session_tip = session_repo
        .head()
        .and_then(|head| head.peel_to_commit())
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    let branch_name = session_repo
        .head()
        .ok()
        .and_then(|head| head.shorthand().map(str::to_string))
        .ok_or_else(|| CyberismoError::InvariantViolation("edit session HEAD is detached".into()))?;

    let repo = open_repo(&project.root)?;
    let main_head = repo.head().map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    let main_commit = main_head
        .peel_to_commit()
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    let is_fast_forward = repo
        .graph_descendant_of(session_tip.id(), main_commit.id())
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    if !is_fast_forward {
        return Err(CyberismoError::Conflict(format!(
            "publishSession: main branch has moved on; fast-forward merge of '{branch_name}' is not possible"
        )));
    }
    let mut main_ref = main_head;
    main_ref
        .set_target(session_tip.id(), "publishSession: fast-forward merge")
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    repo.set_head(main_ref.name().ok_or_else(|| CyberismoError::InvariantViolation("main HEAD has no name".into()))?)
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
        .map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;

    drop(session_repo);
    remove_worktree(&repo, session_id, &worktree_path)?;
    delete_branch(&repo, &branch_name)?;
    project.reload()
}

/// `discardSession(id)`: remove the worktree and its branch without
/// merging.
pub fn discard_session(project_root: &Path, session_id: &str) -> Result<(), CyberismoError> {
    let worktree_path = paths::edit_session_path(project_root, session_id);
    let branch_name = Repository::open(&worktree_path)
        .ok()
        .and_then(|repo| repo.head().ok().and_then(|head| head.shorthand().map(str::to_string)));

    let repo = open_repo(project_root)?;
    remove_worktree(&repo, session_id, &worktree_path)?;
    if let Some(branch_name) = branch_name {
        delete_branch(&repo, &branch_name)?;
    }
    Ok(())
}

fn remove_worktree(repo: &Repository, session_id: &str, worktree_path: &Path) -> Result<(), CyberismoError> {
    if let Ok(worktree) = repo.find_worktree(session_id) {
        let mut prune_opts = git2::WorktreePruneOptions::new();
        prune_opts.working_tree(true);
        worktree
            .prune(Some(&mut prune_opts))
            .map_err(|e| CyberismoError::InvariantViolation(format!("could not prune worktree: {e}")))?;
    }
    crate::core::fsutil::remove_recursive(worktree_path)
}

fn delete_branch(repo: &Repository, branch_name: &str) -> Result<(), CyberismoError> {
    if let Ok(mut branch) = repo.find_branch(branch_name, BranchType::Local) {
        let _ = branch.delete();
    }
    Ok(())
}

/// Orphan cleanup on startup: removes any registered worktree whose
/// working directory no longer exists on disk.
pub fn cleanup_orphans(project_root: &Path) -> Result<usize, CyberismoError> {
    let repo = match Repository::open(project_root) {
        Ok(repo) => repo,
        Err(_) => return Ok(0),
    };
    let names = repo.worktrees().map_err(|e| CyberismoError::InvariantViolation(e.to_string()))?;
    let mut cleaned = 0;
    for name in names.iter().flatten() {
        let Ok(worktree) = repo.find_worktree(name) else { continue };
        if !worktree.path().exists() {
            let mut prune_opts = git2::WorktreePruneOptions::new();
            prune_opts.working_tree(true).valid(true);
            let _ = worktree.prune(Some(&mut prune_opts));
            cleaned += 1;
        }
    }
    Ok(cleaned)
}
