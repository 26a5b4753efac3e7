//! Line-oriented front end for a [`Session`].

use anyhow::{anyhow, bail, Context, Result};
use deck_core::matcher::{DRUG_OPTIONS, RATIONALE_OPTIONS};
use deck_core::{DeckStore, Event, Rasterizer, Sentiment, Session, View};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

pub const HELP: &str = "\
Commands:
  sentiment positive|neutral|critic   set the sentiment
  rationale [TERM,...]                set rationale terms (empty clears)
  drug [NAME,...]                     set drugs (empty clears)
  keyword [TEXT]                      set the keyword (empty clears)
  check N / uncheck N                 select or deselect matching slide N
  all on|off                          check newly shown slides by default
  confirm                             confirm the selection
  download                            export the confirmed selection
  show                                redraw the page
  help                                show this help
  quit                                leave the session";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Event(Event),
    Show,
    Help,
    Quit,
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "sentiment" => Command::Event(Event::SetSentiment(rest.parse::<Sentiment>()?)),
        "rationale" => Command::Event(Event::SetRationale(pick_options(rest, RATIONALE_OPTIONS)?)),
        "drug" | "drugs" => Command::Event(Event::SetDrugs(pick_options(rest, DRUG_OPTIONS)?)),
        "keyword" => Command::Event(Event::SetKeyword(rest.to_string())),
        "check" => Command::Event(Event::Check(parse_position(rest)?)),
        "uncheck" => Command::Event(Event::Uncheck(parse_position(rest)?)),
        "all" => match rest.to_lowercase().as_str() {
            "on" => Command::Event(Event::SelectAll(true)),
            "off" => Command::Event(Event::SelectAll(false)),
            _ => bail!("usage: all on|off"),
        },
        "confirm" => Command::Event(Event::Confirm),
        "download" => Command::Event(Event::Download),
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "" => bail!("empty command"),
        other => bail!("unknown command '{}' (try 'help')", other),
    };
    Ok(command)
}

/// Split a comma separated list and map each entry onto a known option,
/// ignoring case.
fn pick_options(list: &str, options: &[&str]) -> Result<Vec<String>> {
    let mut picked: Vec<String> = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let option = options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(entry))
            .ok_or_else(|| anyhow!("unknown option '{}', expected one of: {}", entry, options.join(", ")))?;
        if !picked.iter().any(|p| p == option) {
            picked.push(option.to_string());
        }
    }
    Ok(picked)
}

fn parse_position(text: &str) -> Result<usize> {
    text.parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| anyhow!("expected a slide number, got '{}'", text))
}

/// Draw a view as plain text.
pub fn render_view(view: &View) -> String {
    let mut out = String::new();
    if let Some(error) = &view.error {
        let _ = writeln!(out, "ERROR: {}", error);
        return out;
    }
    if let Some(path) = &view.loaded {
        let _ = writeln!(out, "Deck: {}", path);
    }

    let form = &view.form;
    let _ = writeln!(out, "Sentiment: {}", form.sentiment);
    let _ = writeln!(out, "Rationale: {}", list_or_none(&form.rationale));
    let _ = writeln!(out, "Drugs: {}", list_or_none(&form.drugs));
    let _ = writeln!(
        out,
        "Keyword: {}",
        if form.keyword.is_empty() { "(none)" } else { form.keyword.as_str() }
    );
    let _ = writeln!(out, "Select all: {}", if view.select_all { "on" } else { "off" });

    if view.rows.is_empty() {
        let _ = writeln!(out, "No slides match the current filters.");
    } else {
        let _ = writeln!(out, "Matching slides:");
        for row in &view.rows {
            let _ = writeln!(
                out,
                "  [{}] Slide {}",
                if row.checked { "x" } else { " " },
                row.position
            );
        }
    }

    if !view.selected.is_empty() {
        let selected: Vec<String> = view.selected.iter().map(usize::to_string).collect();
        let _ = writeln!(out, "Selected: {}", selected.join(", "));
    }
    if view.can_confirm {
        let _ = writeln!(out, "Type 'confirm' to confirm the selection.");
    }
    if view.confirmed {
        let _ = writeln!(out, "Selection confirmed.");
    }
    if let Some(download) = &view.download {
        let _ = writeln!(
            out,
            "Download ready: {} ({} slide(s), {} bytes, {})",
            download.file_name, download.slide_count, download.size, download.mime_type
        );
    }
    out
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

/// Write the session's latest export into `out_dir` under its download name.
pub fn save_download<R: Rasterizer, S: DeckStore>(
    session: &Session<R, S>,
    out_dir: &Path,
) -> Result<Option<PathBuf>> {
    let Some(export) = session.last_export() else {
        return Ok(None);
    };
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(export.file_name());
    std::fs::write(&path, &export.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}

/// Apply one input line. Returns false when the session should end.
pub fn handle_line<R: Rasterizer, S: DeckStore>(
    session: &mut Session<R, S>,
    line: &str,
    out_dir: &Path,
) -> Result<bool> {
    match parse_command(line)? {
        Command::Quit => return Ok(false),
        Command::Help => println!("{}", HELP),
        Command::Show => print!("{}", render_view(&session.view())),
        Command::Event(event) => {
            let download = event == Event::Download;
            let view = session.dispatch(event)?;
            print!("{}", render_view(&view));
            if download {
                let saved = match view.download {
                    Some(_) => save_download(session, out_dir)?,
                    None => None,
                };
                match saved {
                    Some(path) => println!("Saved {}", path.display()),
                    None => println!("Nothing to download: confirm a non-empty selection first."),
                }
            }
        }
    }
    Ok(true)
}

/// Run the interactive loop until `quit` or end of input.
pub fn run<R: Rasterizer, S: DeckStore>(session: &mut Session<R, S>, out_dir: &Path) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("=== Deckorator ===");
    println!("Type 'help' for commands or 'quit' to exit.");
    println!();
    print!("{}", render_view(&session.view()));

    loop {
        match rl.readline("deck> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                match handle_line(session, &line, out_dir) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C detected. Type 'quit' to exit.");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::session::{DownloadView, RowView};
    use deck_core::FilterForm;

    #[test]
    fn test_parse_filter_commands() {
        assert_eq!(
            parse_command("sentiment Positive").unwrap(),
            Command::Event(Event::SetSentiment(Sentiment::Positive))
        );
        assert_eq!(
            parse_command("rationale efficacy, safety/tolerability").unwrap(),
            Command::Event(Event::SetRationale(vec![
                "Efficacy".to_string(),
                "Safety/Tolerability".to_string()
            ]))
        );
        assert_eq!(
            parse_command("rationale").unwrap(),
            Command::Event(Event::SetRationale(vec![]))
        );
        assert_eq!(
            parse_command("drug mariposa").unwrap(),
            Command::Event(Event::SetDrugs(vec!["Mariposa".to_string()]))
        );
        assert_eq!(
            parse_command("keyword  dose escalation ").unwrap(),
            Command::Event(Event::SetKeyword("dose escalation".to_string()))
        );
    }

    #[test]
    fn test_parse_selection_commands() {
        assert_eq!(parse_command("check 3").unwrap(), Command::Event(Event::Check(3)));
        assert_eq!(parse_command("uncheck 3").unwrap(), Command::Event(Event::Uncheck(3)));
        assert_eq!(parse_command("all on").unwrap(), Command::Event(Event::SelectAll(true)));
        assert_eq!(parse_command("CONFIRM").unwrap(), Command::Event(Event::Confirm));
        assert_eq!(parse_command("quit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("check").is_err());
        assert!(parse_command("check 0").is_err());
        assert!(parse_command("all maybe").is_err());
        assert!(parse_command("rationale pricing").is_err());
        assert!(parse_command("sentiment angry").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    fn view() -> View {
        View {
            error: None,
            loaded: Some("backend.pptx".to_string()),
            form: FilterForm::default(),
            select_all: false,
            rows: vec![
                RowView { position: 2, checked: true },
                RowView { position: 5, checked: false },
            ],
            selected: vec![2],
            can_confirm: true,
            confirmed: false,
            download: None,
        }
    }

    #[test]
    fn test_render_rows() {
        let text = render_view(&view());
        assert!(text.contains("[x] Slide 2"));
        assert!(text.contains("[ ] Slide 5"));
        assert!(text.contains("Rationale: Safety/Tolerability"));
        assert!(text.contains("Selected: 2"));
        assert!(text.contains("confirm"));
    }

    #[test]
    fn test_render_missing_deck_shows_only_error() {
        let mut view = view();
        view.error = Some("No backend deck file found at 'x.pptx'".to_string());
        let text = render_view(&view);
        assert!(text.starts_with("ERROR: No backend deck file"));
        assert!(!text.contains("Slide 2"));
    }

    #[test]
    fn test_render_download() {
        let mut view = view();
        view.can_confirm = false;
        view.confirmed = true;
        view.download = Some(DownloadView {
            file_name: "Final_Ppt.pptx".to_string(),
            mime_type: "application/vnd.openxmlformats-officedocument.presentationml.presentation"
                .to_string(),
            size: 1024,
            slide_count: 1,
        });
        let text = render_view(&view);
        assert!(text.contains("Download ready: Final_Ppt.pptx (1 slide(s), 1024 bytes"));
        assert!(!text.contains("Type 'confirm'"));
    }
}
