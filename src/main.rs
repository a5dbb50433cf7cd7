use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod eid;
mod notes;
mod retrieval;
mod storage;
#[cfg(test)]
mod tests;

use app::SearchOpts;
use config::Config;
use eid::Eid;
use notes::{parse_tags, NoteCreate, NoteUpdate};

fn data_dir(args: &cli::Args) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &args.data_dir {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var("NOTERAG_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }

    let home = homedir::my_home()
        .context("failed to resolve home directory")?
        .context("no home directory for current user")?;
    Ok(home.join(".noterag"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let base_path = data_dir(&args)?;
    let base_str = base_path
        .to_str()
        .context("data directory path is not valid utf8")?;
    let config = Config::load_with(base_str);

    let mut app = app::App::init(config, &base_path)?;
    let result = run(&app, args.command);

    // drain pending embedding work before exiting
    app.shutdown();

    result
}

fn run(app: &app::App, command: cli::Command) -> anyhow::Result<()> {
    match command {
        cli::Command::Add {
            title,
            content,
            tags,
            category,
        } => {
            let note = app.create_note(NoteCreate {
                title,
                content,
                tags: tags.map(parse_tags),
                category,
            })?;
            println!("{}", serde_json::to_string_pretty(&note)?);
            Ok(())
        }

        cli::Command::Search {
            query,
            top_k,
            semantic_weight,
            semantic_only,
            category,
        } => {
            let results = app.search(
                &query,
                &SearchOpts {
                    top_k,
                    semantic_weight,
                    semantic_only,
                    category,
                },
            )?;

            if results.is_empty() {
                println!("[]");
                return Ok(());
            }

            let output: Vec<serde_json::Value> = results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "score": r.score,
                        "note": r.note,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }

        cli::Command::Show { id } => {
            let id = Eid::from(id);
            match app.get_note(&id)? {
                Some(note) => println!("{}", serde_json::to_string_pretty(&note)?),
                None => bail!("note {id} not found"),
            }
            Ok(())
        }

        cli::Command::List {} => {
            let notes = app.list_notes()?;
            println!("{}", serde_json::to_string_pretty(&notes)?);
            Ok(())
        }

        cli::Command::Update {
            id,
            title,
            content,
            tags,
            append_tags,
            remove_tags,
            category,
        } => {
            let update = NoteUpdate {
                title,
                content,
                tags: tags.map(parse_tags),
                append_tags: append_tags.map(parse_tags),
                remove_tags: remove_tags.map(parse_tags),
                category,
            };

            if update.title.is_none()
                && update.content.is_none()
                && update.tags.is_none()
                && update.append_tags.is_none()
                && update.remove_tags.is_none()
                && update.category.is_none()
            {
                println!("This update request does nothing");
                return Ok(());
            }

            let note = app.update_note(&Eid::from(id), update)?;
            println!("{}", serde_json::to_string_pretty(&note)?);
            Ok(())
        }

        cli::Command::Delete { id, yes } => {
            let id = Eid::from(id);
            let Some(note) = app.get_note(&id)? else {
                bail!("note {id} not found");
            };

            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Are you sure you want to delete '{}'?",
                    note.title
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            app.delete_note(&id)?;
            println!("deleted {id}");
            Ok(())
        }

        cli::Command::Reindex { batch_size } => {
            let report = app.reindex(batch_size)?;
            println!(
                "reindexed {} notes, {} errors",
                report.processed, report.errors
            );
            Ok(())
        }

        cli::Command::Status {} => {
            let status = app.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }

        cli::Command::Tags {} => {
            for tag in app.distinct_tags()? {
                println!("{tag}");
            }
            Ok(())
        }

        cli::Command::Categories {} => {
            for category in app.distinct_categories()? {
                println!("{category}");
            }
            Ok(())
        }
    }
}
