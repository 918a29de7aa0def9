//! Thin CLI entry point: parse arguments, open a project, call exactly
//! one engine method, render the outcome. No business logic lives here
//! (spec §1 places CLI argument parsing itself out of the core's scope;
//! this binary is the translation layer that sits on top of it).

mod cli;

use clap::Parser;
use cyberismo_core::core::error::CyberismoError;
use cyberismo_core::core::output::CommandOutcome;
use cyberismo_core::project::Project;
use cli::{CalcCli, CardCommand, Cli, Command, IoCommand, ResourceCommand, SessionCommand};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.format.clone();
    let outcome = run(cli);
    let code = match &outcome {
        Ok(o) => {
            o.print(&format);
            0
        }
        Err(e) => {
            CommandOutcome::error("cyberismo", e.to_string()).print(&format);
            e.exit_code() as u8
        }
    };
    ExitCode::from(code)
}

fn project_root(explicit: &Option<PathBuf>) -> Result<PathBuf, CyberismoError> {
    match explicit {
        Some(p) => Ok(p.clone()),
        None => {
            let cwd = std::env::current_dir().map_err(|e| CyberismoError::filesystem(".", e))?;
            cyberismo_core::config::discover_project_root(&cwd)
        }
    }
}

fn run(cli: Cli) -> Result<CommandOutcome, CyberismoError> {
    if let Command::Init(init) = &cli.command {
        let root = cli.project.clone().unwrap_or(std::env::current_dir().map_err(|e| CyberismoError::filesystem(".", e))?);
        Project::init(&root, &init.name, &init.prefix)?;
        return Ok(CommandOutcome::ok(
            "init",
            format!("created project '{}' with prefix '{}' at {}", init.name, init.prefix, root.display()),
            serde_json::json!({ "root": root, "prefix": init.prefix }),
        ));
    }

    let root = project_root(&cli.project)?;
    let mut project = Project::open(&root)?;

    match cli.command {
        Command::Init(_) => unreachable!("handled above"),
        Command::Card { command } => run_card(&mut project, command),
        Command::Resource { command } => run_resource(&mut project, command),
        Command::Io { command } => run_io(&mut project, command),
        Command::Session { command } => run_session(&mut project, command),
        Command::Calc(calc) => run_calc(&mut project, calc),
        Command::Doctor => run_doctor(&mut project),
    }
}

fn run_card(project: &mut Project, command: CardCommand) -> Result<CommandOutcome, CyberismoError> {
    use cyberismo_core::commands::{card, rank, transition};
    match command {
        CardCommand::Create { template, parent } => {
            let keys = card::create_card(project, &template, parent.as_deref())?;
            Ok(CommandOutcome::ok(
                "card.create",
                format!("created {} card(s) from '{template}'", keys.len()),
                serde_json::json!({ "keys": keys }),
            ))
        }
        CardCommand::Show { key } => {
            let c = project.cards.get_card(&key).ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
            Ok(CommandOutcome::ok(
                "card.show",
                format!("{} [{}] {}", c.key, c.metadata.workflow_state, c.metadata.title),
                serde_json::json!({
                    "key": c.key,
                    "parent": c.parent,
                    "children": c.children,
                    "location": c.location.as_str(),
                    "metadata": c.metadata,
                    "content": c.content,
                    "attachments": c.attachments,
                }),
            ))
        }
        CardCommand::List => {
            let mut keys: Vec<String> = project.cards.get_project_cards().map(|c| c.key.clone()).collect();
            keys.sort();
            Ok(CommandOutcome::ok(
                "card.list",
                format!("{} card(s)", keys.len()),
                serde_json::json!({ "keys": keys }),
            ))
        }
        CardCommand::EditContent { key, content_file } => {
            let content = std::fs::read_to_string(&content_file).map_err(|e| CyberismoError::filesystem(&content_file, e))?;
            card::edit_card_content(project, &key, &content)?;
            Ok(CommandOutcome::ok("card.editContent", format!("updated content of '{key}'"), serde_json::json!({ "key": key })))
        }
        CardCommand::EditField { key, field, value } => {
            card::edit_card_metadata(project, &key, &field, &value)?;
            Ok(CommandOutcome::ok(
                "card.editField",
                format!("set '{field}' on '{key}'"),
                serde_json::json!({ "key": key, "field": field }),
            ))
        }
        CardCommand::Move { key, destination } => {
            card::move_card(project, &key, &destination)?;
            Ok(CommandOutcome::ok("card.move", format!("moved '{key}' under '{destination}'"), serde_json::json!({ "key": key })))
        }
        CardCommand::RankTo { key, index } => {
            rank::rank_by_index(project, &key, index)?;
            Ok(CommandOutcome::ok("card.rankTo", format!("ranked '{key}' to index {index}"), serde_json::json!({ "key": key })))
        }
        CardCommand::RankBefore { key, before } => {
            rank::rank_before(project, &key, &before)?;
            Ok(CommandOutcome::ok("card.rankBefore", format!("ranked '{key}' before '{before}'"), serde_json::json!({ "key": key })))
        }
        CardCommand::RankFirst { key } => {
            rank::rank_first(project, &key)?;
            Ok(CommandOutcome::ok("card.rankFirst", format!("ranked '{key}' first"), serde_json::json!({ "key": key })))
        }
        CardCommand::Rebalance { parent } => {
            rank::rebalance(project, &parent)?;
            Ok(CommandOutcome::ok("card.rebalance", format!("rebalanced children of '{parent}'"), serde_json::json!({ "parent": parent })))
        }
        CardCommand::Transition { key, transition: name } => {
            transition::transition(project, &key, &name)?;
            Ok(CommandOutcome::ok("card.transition", format!("ran '{name}' on '{key}'"), serde_json::json!({ "key": key })))
        }
        CardCommand::Link { from, to, link_type, description } => {
            card::create_link(project, &from, &to, &link_type, description.as_deref())?;
            Ok(CommandOutcome::ok("card.link", format!("linked '{from}' -> '{to}'"), serde_json::json!({ "from": from, "to": to })))
        }
        CardCommand::Unlink { from, to, link_type, description } => {
            card::remove_link(project, &from, &to, &link_type, description.as_deref())?;
            Ok(CommandOutcome::ok("card.unlink", format!("unlinked '{from}' -> '{to}'"), serde_json::json!({ "from": from, "to": to })))
        }
        CardCommand::Remove { key } => {
            let removed = card::remove_card(project, &key)?;
            Ok(CommandOutcome::ok(
                "card.remove",
                format!("removed {} card(s)", removed.len()),
                serde_json::json!({ "removed": removed }),
            ))
        }
    }
}

fn run_resource(project: &mut Project, command: ResourceCommand) -> Result<CommandOutcome, CyberismoError> {
    use cyberismo_core::commands::resource_ops;
    match command {
        ResourceCommand::Remove { name } => {
            resource_ops::remove_resource(project, &name)?;
            Ok(CommandOutcome::ok("resource.remove", format!("removed '{name}'"), serde_json::json!({ "name": name })))
        }
        ResourceCommand::ImportModule { location, branch } => {
            let prefix = resource_ops::import_module(project, &location, branch.as_deref())?;
            Ok(CommandOutcome::ok(
                "resource.importModule",
                format!("imported module with prefix '{prefix}'"),
                serde_json::json!({ "prefix": prefix }),
            ))
        }
        ResourceCommand::RemoveModule { prefix } => {
            resource_ops::remove_module(project, &prefix)?;
            Ok(CommandOutcome::ok("resource.removeModule", format!("removed module '{prefix}'"), serde_json::json!({ "prefix": prefix })))
        }
        ResourceCommand::Rename { new_prefix } => {
            resource_ops::rename_project(project, &new_prefix)?;
            Ok(CommandOutcome::ok(
                "resource.rename",
                format!("renamed project prefix to '{new_prefix}'"),
                serde_json::json!({ "newPrefix": new_prefix }),
            ))
        }
        ResourceCommand::Validate => {
            let problems = resource_ops::validate(project)?;
            Ok(CommandOutcome::ok(
                "resource.validate",
                format!("{} problem(s) found", problems.len()),
                serde_json::json!({ "problems": problems }),
            ))
        }
        ResourceCommand::Publish => {
            let published = resource_ops::publish_draft(project)?;
            Ok(CommandOutcome::ok("resource.publish", format!("published version {published}"), serde_json::json!({ "version": published })))
        }
    }
}

fn run_io(project: &mut Project, command: IoCommand) -> Result<CommandOutcome, CyberismoError> {
    use cyberismo_core::commands::export::{self, ExportFormat};
    match command {
        IoCommand::ImportCsv { csv_path, card_type, parent } => {
            let keys = export::import_csv(project, &csv_path, &card_type, parent.as_deref())?;
            Ok(CommandOutcome::ok(
                "io.importCsv",
                format!("created {} card(s) from {}", keys.len(), csv_path.display()),
                serde_json::json!({ "keys": keys }),
            ))
        }
        IoCommand::Export { out_dir, format } => {
            let fmt = ExportFormat::parse(&format)?;
            let count = export::export_tree(project, &out_dir, fmt)?;
            Ok(CommandOutcome::ok(
                "io.export",
                format!("exported {count} card(s) to {}", out_dir.display()),
                serde_json::json!({ "count": count }),
            ))
        }
    }
}

fn run_session(project: &mut Project, command: SessionCommand) -> Result<CommandOutcome, CyberismoError> {
    use cyberismo_core::edit_session;
    match command {
        SessionCommand::Start { card_key } => {
            let session = edit_session::start_session(project, &card_key)?;
            Ok(CommandOutcome::ok(
                "session.start",
                format!("started session '{}' for '{card_key}'", session.id),
                serde_json::to_value(&session)?,
            ))
        }
        SessionCommand::Save { id } => {
            let committed = edit_session::save_session(&project.root, &id)?;
            Ok(CommandOutcome::ok(
                "session.save",
                if committed { format!("saved session '{id}'") } else { format!("session '{id}' had nothing to save") },
                serde_json::json!({ "id": id, "committed": committed }),
            ))
        }
        SessionCommand::Publish { id } => {
            edit_session::publish_session(project, &id)?;
            Ok(CommandOutcome::ok("session.publish", format!("published session '{id}'"), serde_json::json!({ "id": id })))
        }
        SessionCommand::Discard { id } => {
            edit_session::discard_session(&project.root, &id)?;
            Ok(CommandOutcome::ok("session.discard", format!("discarded session '{id}'"), serde_json::json!({ "id": id })))
        }
        SessionCommand::Cleanup => {
            let removed = edit_session::cleanup_orphans(&project.root)?;
            Ok(CommandOutcome::ok("session.cleanup", format!("removed {removed} orphaned session(s)"), serde_json::json!({ "removed": removed })))
        }
    }
}

fn run_calc(project: &mut Project, calc: CalcCli) -> Result<CommandOutcome, CyberismoError> {
    let raw = std::fs::read_to_string(&calc.program_file).map_err(|e| CyberismoError::filesystem(&calc.program_file, e))?;
    let facts = project.calc.run_logic_program(&raw)?;
    let rendered: Vec<String> = facts.iter().map(|f| format!("{}({})", f.predicate, f.args.join(", "))).collect();
    Ok(CommandOutcome::ok(
        "calc.run",
        format!("{} fact(s)", facts.len()),
        serde_json::json!({ "facts": rendered }),
    ))
}

fn run_doctor(project: &mut Project) -> Result<CommandOutcome, CyberismoError> {
    let report = cyberismo_core::doctor::run(project)?;
    Ok(CommandOutcome::ok(
        "doctor",
        format!("{} passed, {} warning(s), {} failed", report.passed, report.warnings, report.failed),
        serde_json::to_value(&report)?,
    ))
}
