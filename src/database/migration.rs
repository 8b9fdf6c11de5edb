//! Single-file migration source
//!
//! All migrations live in one sql file that is embedded into the binary.
//! A migration starts with a header comment carrying version and description:
//! ```text
//! --##1 initial schema
//! ```
//! Versions have to increase by one for every new migration.
use std::{borrow::Cow, future::Future, pin::Pin};

use sqlx::{
    error::BoxDynError,
    migrate::{Migration, MigrationSource, MigrationType},
};

const HEADER_PREFIX: &str = "--##";

#[derive(Debug)]
pub struct MigrationScript<'s> {
    data: &'s str,
}

struct PendingMigration {
    version: i64,
    description: String,
    sql: String,
}

impl PendingMigration {
    fn from_header(line: &str) -> Result<Self, BoxDynError> {
        let header = &line[HEADER_PREFIX.len()..];
        let (version, description) = header.split_once(' ').unwrap_or((header, ""));
        let version = version.parse::<i64>().map_err(|e| {
            format!("cannot parse version of migration header '{line}' as int: {e}")
        })?;

        Ok(Self {
            version,
            description: description.trim().to_string(),
            sql: String::new(),
        })
    }

    fn build(self) -> Migration {
        Migration::new(
            self.version,
            Cow::Owned(self.description),
            MigrationType::Simple,
            Cow::Owned(self.sql),
        )
    }
}

fn parse_script(data: &str) -> Result<Vec<Migration>, BoxDynError> {
    let mut migrations: Vec<PendingMigration> = Vec::new();

    for line in data.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with(HEADER_PREFIX) {
            migrations.push(PendingMigration::from_header(line)?);
            continue;
        }

        match migrations.last_mut() {
            Some(migration) => {
                migration.sql.push_str(line);
                migration.sql.push('\n');
            }
            // comments before the first header are allowed
            None if line.starts_with("--") => continue,
            None => Err(format!(
                "migration script does not start with a migration header, got: {line}"
            ))?,
        }
    }

    Ok(migrations.into_iter().map(PendingMigration::build).collect())
}

impl<'s> MigrationSource<'s> for MigrationScript<'s> {
    fn resolve(
        self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Migration>, BoxDynError>> + Send + 's>> {
        Box::pin(async move { parse_script(self.data) })
    }
}

pub fn postgresql_migrations() -> MigrationScript<'static> {
    MigrationScript {
        data: include_str!("./sql/migrations.pg.sql"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let migrations = parse_script(
            "-- leading comment\n--##1 initial schema\nCREATE TABLE a (id BIGINT);\n\n--##2 second\nCREATE TABLE b (id BIGINT);\n",
        )
        .unwrap();

        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].description, "initial schema");
        assert_eq!(migrations[1].sql, "CREATE TABLE b (id BIGINT);\n");
    }

    #[test]
    fn test_parse_script_requires_header() {
        assert!(parse_script("CREATE TABLE a (id BIGINT);").is_err());
        assert!(parse_script("--##x broken").is_err());
    }

    #[test]
    fn test_embedded_script_parses() {
        let migrations = parse_script(postgresql_migrations().data).unwrap();
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[1].version, 2);
        assert!(migrations[1].sql.contains("attempts"));
    }
}
