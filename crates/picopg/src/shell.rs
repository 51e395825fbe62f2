//! Interactive SQL shell.
//!
//! Lines are collected until one ends with `;`, then the whole statement is
//! sent. Backslash commands are only recognized at the start of a statement.

use picopg_core::{PicoError, PicoState};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::render;

/// A backslash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Quit,
    Help,
    ListTables,
    ListDatabases,
    Describe { schema: Option<String>, table: String },
    Preview { schema: Option<String>, table: String },
    Unknown(String),
}

impl MetaCommand {
    fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let argument = parts.next();
        match (command, argument) {
            ("\\q", _) => Self::Quit,
            ("\\?", _) => Self::Help,
            ("\\dt", _) => Self::ListTables,
            ("\\l", _) => Self::ListDatabases,
            ("\\d", Some(name)) => {
                let (schema, table) = split_qualified(name);
                Self::Describe { schema, table }
            }
            ("\\d", None) => Self::ListTables,
            ("\\preview", Some(name)) => {
                let (schema, table) = split_qualified(name);
                Self::Preview { schema, table }
            }
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// `schema.table` or a bare `table`.
fn split_qualified(name: &str) -> (Option<String>, String) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema.to_string()), table.to_string()),
        None => (None, name.to_string()),
    }
}

/// One complete unit of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Meta(MetaCommand),
    Statement(String),
}

/// Accumulates lines into statements.
#[derive(Debug, Default)]
pub struct StatementBuffer {
    buffer: String,
}

impl StatementBuffer {
    /// Feed one line; returns a complete input once one is available.
    pub fn push_line(&mut self, line: &str) -> Option<ShellInput> {
        let trimmed = line.trim();
        if self.buffer.is_empty() {
            if trimmed.is_empty() {
                return None;
            }
            if trimmed.starts_with('\\') {
                return Some(ShellInput::Meta(MetaCommand::parse(trimmed)));
            }
        }

        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line.trim_end());

        if trimmed.ends_with(';') {
            Some(ShellInput::Statement(std::mem::take(&mut self.buffer)))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

const HELP: &str = "\
  \\dt              list tables
  \\d <table>       describe a table (schema.table also works)
  \\preview <table> show the first 100 rows of a table
  \\l               list databases
  \\q               quit
  Statements end with ';'.";

/// Run the shell for a saved profile until `\q` or end of input.
pub fn run(state: &PicoState, key: &str) -> Result<(), PicoError> {
    let profile = state.profile(key)?;
    let key = profile.id.to_string();

    let mut editor = DefaultEditor::new()
        .map_err(|e| PicoError::internal(format!("Failed to start line editor: {e}")))?;

    println!("Connection \"{}\" ({})", profile.name, profile.display_url());
    println!("Type \\? for help.");

    let mut input = StatementBuffer::default();
    loop {
        let prompt =
            if input.is_empty() { format!("{}=> ", profile.name) } else { format!("{}-> ", profile.name) };

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                input.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(PicoError::internal(format!("Failed to read input: {e}"))),
        };

        let Some(complete) = input.push_line(&line) else { continue };
        match complete {
            ShellInput::Meta(MetaCommand::Quit) => break,
            ShellInput::Meta(command) => {
                let _ = editor.add_history_entry(line.trim());
                run_meta(state, &key, command);
            }
            ShellInput::Statement(sql) => {
                let _ = editor.add_history_entry(sql.as_str());
                match state.run_query(&key, &sql) {
                    Ok(result) => println!("{}\n", render::query_result(&result)),
                    Err(e) => print_error(&e),
                }
            }
        }
    }

    tracing::debug!(connection_id = %profile.id, "Shell closed");
    Ok(())
}

fn run_meta(state: &PicoState, key: &str, command: MetaCommand) {
    let output = match command {
        MetaCommand::Quit => return,
        MetaCommand::Help => Ok(HELP.to_string()),
        MetaCommand::ListTables => state.fetch_tables(key).map(|t| render::tables(&t)),
        MetaCommand::ListDatabases => state.fetch_databases(key).map(|d| render::databases(&d)),
        MetaCommand::Describe { schema, table } => {
            state.fetch_columns(key, &table, schema.as_deref()).map(|c| render::columns(&c))
        }
        MetaCommand::Preview { schema, table } => state
            .preview_table(key, &table, schema.as_deref(), None)
            .map(|r| render::query_result(&r)),
        MetaCommand::Unknown(text) => Ok(format!("Unknown command: {text}. Try \\?")),
    };
    match output {
        Ok(text) => println!("{text}\n"),
        Err(e) => print_error(&e),
    }
}

fn print_error(e: &PicoError) {
    let info = e.to_error_info();
    eprintln!("ERROR: {}", info.message);
    if let Some(hint) = info.hint {
        eprintln!("HINT: {hint}");
    }
    if let Some(detail) = info.technical_detail {
        eprintln!("{detail}");
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_spans_lines() {
        let mut input = StatementBuffer::default();
        assert_eq!(input.push_line("SELECT *"), None);
        assert!(!input.is_empty());
        assert_eq!(input.push_line("  FROM users"), None);
        assert_eq!(
            input.push_line("WHERE id = 1;  "),
            Some(ShellInput::Statement("SELECT *\n  FROM users\nWHERE id = 1;".to_string()))
        );
        assert!(input.is_empty());
    }

    #[test]
    fn test_blank_lines_are_ignored_between_statements() {
        let mut input = StatementBuffer::default();
        assert_eq!(input.push_line("   "), None);
        assert!(input.is_empty());
    }

    #[test]
    fn test_meta_commands() {
        let mut input = StatementBuffer::default();
        assert_eq!(input.push_line("\\q"), Some(ShellInput::Meta(MetaCommand::Quit)));
        assert_eq!(input.push_line(" \\dt "), Some(ShellInput::Meta(MetaCommand::ListTables)));
        assert_eq!(
            input.push_line("\\d users"),
            Some(ShellInput::Meta(MetaCommand::Describe { schema: None, table: "users".into() }))
        );
        assert_eq!(
            input.push_line("\\d audit.events"),
            Some(ShellInput::Meta(MetaCommand::Describe {
                schema: Some("audit".into()),
                table: "events".into()
            }))
        );
        assert_eq!(
            input.push_line("\\preview audit.events"),
            Some(ShellInput::Meta(MetaCommand::Preview {
                schema: Some("audit".into()),
                table: "events".into()
            }))
        );
        assert_eq!(
            input.push_line("\\preview"),
            Some(ShellInput::Meta(MetaCommand::Unknown("\\preview".into())))
        );
        assert_eq!(
            input.push_line("\\x"),
            Some(ShellInput::Meta(MetaCommand::Unknown("\\x".into())))
        );
    }

    #[test]
    fn test_backslash_inside_statement_is_sql() {
        let mut input = StatementBuffer::default();
        assert_eq!(input.push_line("SELECT"), None);
        assert_eq!(
            input.push_line("\\q;"),
            Some(ShellInput::Statement("SELECT\n\\q;".to_string()))
        );
    }
}
