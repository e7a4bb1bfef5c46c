//! Command execution.

use crate::{Commands, TargetArgs};
use colored::Colorize;
use subd_client::{ClientError, PageState, Session, Status, Update};
use subd_protocol::{Command, Record, RecordFields};

/// Executes a one-shot command and returns the formatted output.
///
/// The server keeps the open file and selection per connection, so every
/// command except `open` first re-opens the file stored in the session state.
/// Re-opening selects every record, so `update` and `remove` send their
/// filter as a `select` before the change.
pub async fn execute(
    session: &mut Session,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    // Nothing is sent for a mutation that names no records.
    match &cmd {
        Commands::Update { fields, target } => {
            Command::update(&fields.to_fields())?;
            target.check()?;
        }
        Commands::Remove(target) => target.check()?,
        _ => {}
    }

    if !matches!(cmd, Commands::Open { .. }) && session.state().current_file().is_some() {
        session.reopen().await?;
    }

    let update = match cmd {
        Commands::Repl => unreachable!(),

        Commands::Open { file } => session.open(&file).await?,

        Commands::Show { page, size } => {
            let mut update = None;
            if let Some(size) = size {
                update = Some(session.change_page_size(size).await?);
            }
            if let Some(page) = page {
                update = Some(session.goto_page(page).await?);
            }
            match update {
                Some(update) => update,
                None => session.reload().await?,
            }
        }

        Commands::Select(filter) => session.select(&filter.to_filter()).await?,

        Commands::Reselect(filter) => session.reselect(&filter.to_filter()).await?,

        Commands::Add {
            name,
            group,
            rating,
            info,
        } => {
            let fields = RecordFields::new()
                .with_name(name)
                .with_group(group)
                .with_rating(rating)
                .with_info(info);
            session.add(&fields).await?
        }

        Commands::Update { fields, target } => {
            select_target(session, &target).await?;
            session.update(&fields.to_fields()).await?
        }

        Commands::Remove(target) => {
            select_target(session, &target).await?;
            session.remove().await?
        }

        Commands::Save => session.save().await?,

        Commands::Exec { command } => session.raw(&command).await?,
    };

    Ok(format_update(&update, session.state()))
}

/// Narrows the server's selection to the target. With `--all` the selection
/// left by re-opening the file is kept.
async fn select_target(session: &mut Session, target: &TargetArgs) -> Result<(), ClientError> {
    let filter = target.to_filter();
    if !filter.is_empty() {
        session.select(&filter).await?;
    }
    Ok(())
}

/// Formats an action outcome, with the current page when it was reloaded.
pub fn format_update(update: &Update, state: &PageState) -> String {
    let mut output = format_status(&update.status);
    if update.reloaded && !state.rows().is_empty() {
        let footer = format!(
            "Page {} ({} per page, {} shown)",
            state.page(),
            state.page_size(),
            state.rows().len()
        );
        output.push('\n');
        output.push_str(&format_table(state.rows()));
        output.push('\n');
        output.push_str(&footer.dimmed().to_string());
    }
    output
}

pub fn format_status(status: &Status) -> String {
    if status.ok {
        status.text.green().to_string()
    } else {
        status.text.red().to_string()
    }
}

/// Lays rows out in aligned columns.
pub fn format_table(rows: &[Record]) -> String {
    const HEADERS: [&str; 5] = ["ID", "Name", "Group", "Rating", "Info"];

    let cells: Vec<[&str; 5]> = rows
        .iter()
        .map(|r| [&r.id[..], &r.name[..], &r.group[..], &r.rating[..], &r.info[..]])
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    output.push_str(&format_line(&HEADERS, &widths).bold().to_string());
    for row in &cells {
        output.push('\n');
        output.push_str(&format_line(row, &widths));
    }
    output
}

fn format_line(cells: &[&str; 5], widths: &[usize; 5]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width - cell.chars().count();
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
