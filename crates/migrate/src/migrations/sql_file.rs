//! SQL file migrations
//!
//! A migration can be a plain `<version>_<name>.sql` file with `-- up` and
//! `-- down` sections. Statements are split with the sqlparser tokenizer so
//! semicolons inside string literals and comments are left alone.

use async_trait::async_trait;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::definitions::{Migration, MigrationKind};
use crate::error::{MigrationError, MigrationResult};
use crate::schema::Schema;

/// Migration backed by the statements of a `.sql` file
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFileMigration {
    version: i64,
    name: String,
    path: Option<PathBuf>,
    up: Vec<String>,
    /// `None` when the file has no down section
    down: Option<Vec<String>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

impl SqlFileMigration {
    /// Parse migration content
    pub fn parse(version: i64, name: impl Into<String>, content: &str) -> MigrationResult<Self> {
        let marker = Regex::new(r"(?i)^--\s*\+?\s*(up|down)\b")
            .map_err(|e| MigrationError::Validation(e.to_string()))?;

        let mut up = String::new();
        let mut down = String::new();
        let mut has_markers = false;
        let mut has_down = false;
        let mut section = Section::Preamble;

        for line in content.lines() {
            if let Some(caps) = marker.captures(line.trim()) {
                has_markers = true;
                section = if caps[1].eq_ignore_ascii_case("up") {
                    Section::Up
                } else {
                    has_down = true;
                    Section::Down
                };
                continue;
            }
            let target = match section {
                Section::Up => &mut up,
                Section::Down => &mut down,
                Section::Preamble => continue,
            };
            target.push_str(line);
            target.push('\n');
        }

        // a file without markers is one forward-only script
        if !has_markers {
            up = content.to_string();
        }

        Ok(Self {
            version,
            name: name.into(),
            path: None,
            up: split_statements(&up),
            down: has_down.then(|| split_statements(&down)),
        })
    }

    /// Load `<version>_<name>.sql`
    pub fn from_file(path: &Path) -> MigrationResult<Self> {
        let (version, name) = parse_file_name(path)?;
        let content = fs::read_to_string(path)?;
        let mut migration = Self::parse(version, name, &content)?;
        migration.path = Some(path.to_path_buf());
        Ok(migration)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    pub fn down_statements(&self) -> Option<&[String]> {
        self.down.as_deref()
    }
}

/// Split a migration file name into version and name
pub fn parse_file_name(path: &Path) -> MigrationResult<(i64, String)> {
    let invalid = || {
        MigrationError::Validation(format!(
            "migration file name '{}' does not match <version>_<name>.sql",
            path.display()
        ))
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;
    let (version, name) = stem.split_once('_').ok_or_else(invalid)?;
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return Err(invalid());
    }
    let version = version.parse::<i64>().map_err(|_| invalid())?;
    Ok((version, name.to_string()))
}

/// Split a script into statements on top-level semicolons
pub fn split_statements(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};
    // keep escapes so tokens print back as written
    let mut tokenizer = Tokenizer::new(&dialect, sql).with_unescape(false);
    let tokens = match tokenizer.tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("SQL tokenizing failed, using naive semicolon splitting: {}", e);
            return sql
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty() && !is_comment_only(s))
                .map(str::to_string)
                .collect();
        }
    };

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_content = false;
    for token in tokens {
        match token {
            Token::SemiColon => {
                if has_content {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_content = false;
            }
            Token::Whitespace(_) => current.push_str(&token.to_string()),
            Token::EOF => {}
            other => {
                has_content = true;
                current.push_str(&other.to_string());
            }
        }
    }
    if has_content {
        statements.push(current.trim().to_string());
    }
    statements
}

fn is_comment_only(chunk: &str) -> bool {
    chunk
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[async_trait]
impl Migration for SqlFileMigration {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MigrationKind {
        if self.down.is_some() {
            MigrationKind::UpDown
        } else {
            MigrationKind::Irreversible
        }
    }

    async fn up(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        for statement in &self.up {
            schema.execute(statement.clone()).await?;
        }
        Ok(())
    }

    async fn down(&self, schema: &mut Schema<'_>) -> MigrationResult<()> {
        let Some(statements) = &self.down else {
            return Err(MigrationError::Irreversible {
                version: self.version,
                name: self.name.clone(),
                reason: "the SQL file has no down section".to_string(),
            });
        };
        for statement in statements {
            schema.execute(statement.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_literals() {
        let statements = split_statements(
            "INSERT INTO notes (body) VALUES ('a;b');\n-- trailing; comment\nDELETE FROM notes;\n",
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO notes (body) VALUES ('a;b')");
        assert!(statements[1].ends_with("DELETE FROM notes"));
    }

    #[test]
    fn test_split_skips_empty_statements() {
        assert!(split_statements(" ; ;\n-- nothing here\n").is_empty());
    }

    #[test]
    fn test_split_keeps_escaped_quotes() {
        assert_eq!(
            split_statements("INSERT INTO notes (body) VALUES ('it''s');"),
            vec!["INSERT INTO notes (body) VALUES ('it''s')".to_string()]
        );
    }

    #[test]
    fn test_parse_sections() {
        let content = "-- create the notes table\n\
                       -- up\n\
                       CREATE TABLE notes (id INTEGER PRIMARY KEY);\n\
                       CREATE INDEX notes_id ON notes (id);\n\
                       -- down\n\
                       DROP TABLE notes;\n";
        let migration = SqlFileMigration::parse(3, "create_notes", content).unwrap();
        assert_eq!(migration.up_statements().len(), 2);
        assert_eq!(
            migration.down_statements(),
            Some(&["DROP TABLE notes".to_string()][..])
        );
        assert_eq!(migration.kind(), MigrationKind::UpDown);
    }

    #[test]
    fn test_file_without_down_is_irreversible() {
        let migration =
            SqlFileMigration::parse(4, "seed_flags", "-- +up\nUPDATE flags SET on = 1;\n").unwrap();
        assert_eq!(migration.kind(), MigrationKind::Irreversible);

        let bare = SqlFileMigration::parse(5, "bare", "DELETE FROM flags;").unwrap();
        assert_eq!(bare.up_statements(), &["DELETE FROM flags".to_string()]);
        assert_eq!(bare.kind(), MigrationKind::Irreversible);
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name(Path::new("db/20240102030405_add_email.sql")).unwrap(),
            (20240102030405, "add_email".to_string())
        );
        assert!(parse_file_name(Path::new("add_email.sql")).is_err());
        assert!(parse_file_name(Path::new("v1_add_email.sql")).is_err());
    }
}
