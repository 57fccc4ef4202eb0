//! SQLite storage backend

use super::traits::{OpenStore, StorageError, StorageResult, StoredWiki, WikiStore};
use crate::processor::SessionState;
use crate::wiki::{Attribute, Entity, KnowledgeTree, Section, SectionKind};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed wiki store
///
/// One row per wiki, section, entity and attribute. Rows carry a position
/// column so insertion order survives a round trip. Thread-safe via an
/// internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wikis (
                name TEXT PRIMARY KEY,
                session_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sections (
                wiki TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                kind_json TEXT NOT NULL,
                template_json TEXT NOT NULL,
                PRIMARY KEY (wiki, name),
                FOREIGN KEY (wiki) REFERENCES wikis(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS entities (
                wiki TEXT NOT NULL,
                section TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TEXT,
                PRIMARY KEY (wiki, section, name),
                FOREIGN KEY (wiki, section) REFERENCES sections(wiki, name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS attributes (
                wiki TEXT NOT NULL,
                section TEXT NOT NULL,
                entity TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                attribute_json TEXT NOT NULL,
                PRIMARY KEY (wiki, section, entity, name),
                FOREIGN KEY (wiki, section, entity)
                    REFERENCES entities(wiki, section, name) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_entities_order
                ON entities(wiki, section, position);
            CREATE INDEX IF NOT EXISTS idx_attributes_order
                ON attributes(wiki, section, entity, position);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn parse_date(s: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn load_sections(conn: &Connection, wiki: &str) -> StorageResult<Vec<Section>> {
        let mut attributes: HashMap<(String, String), Vec<Attribute>> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT section, entity, attribute_json FROM attributes
             WHERE wiki = ?1 ORDER BY section, entity, position",
        )?;
        let rows = stmt.query_map(params![wiki], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (section, entity, json) = row?;
            attributes
                .entry((section, entity))
                .or_default()
                .push(serde_json::from_str(&json)?);
        }

        let mut entities: HashMap<String, Vec<Entity>> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT section, name, created_at FROM entities
             WHERE wiki = ?1 ORDER BY section, position",
        )?;
        let rows = stmt.query_map(params![wiki], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        for row in rows {
            let (section, name, created_at) = row?;
            let created_at = created_at.as_deref().map(Self::parse_date).transpose()?;
            let attrs = attributes
                .remove(&(section.clone(), name.clone()))
                .unwrap_or_default();
            entities
                .entry(section)
                .or_default()
                .push(Entity::from_parts(name, attrs, created_at));
        }

        let mut sections = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT name, kind_json, template_json FROM sections
             WHERE wiki = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![wiki], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (name, kind_json, template_json) = row?;
            let kind: SectionKind = serde_json::from_str(&kind_json)?;
            let template: Vec<Attribute> = serde_json::from_str(&template_json)?;
            let section_entities = entities.remove(&name).unwrap_or_default();
            sections.push(Section::from_parts(name, kind, template, section_entities));
        }

        Ok(sections)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl WikiStore for SqliteStore {
    fn save(&self, tree: &KnowledgeTree, session: &SessionState) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for table in ["attributes", "entities", "sections", "wikis"] {
            let column = if table == "wikis" { "name" } else { "wiki" };
            let sql = format!("DELETE FROM {} WHERE {} = ?1", table, column);
            tx.execute(&sql, params![tree.name])?;
        }

        tx.execute(
            "INSERT INTO wikis (name, session_json, updated_at) VALUES (?1, ?2, ?3)",
            params![tree.name, serde_json::to_string(session)?, session.updated_at.to_rfc3339()],
        )?;

        for (s_pos, section) in tree.sections().enumerate() {
            tx.execute(
                "INSERT INTO sections (wiki, name, position, kind_json, template_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tree.name,
                    section.name(),
                    s_pos as i64,
                    serde_json::to_string(&section.kind())?,
                    serde_json::to_string(section.template())?,
                ],
            )?;

            for (e_pos, entity) in section.entities().enumerate() {
                tx.execute(
                    "INSERT INTO entities (wiki, section, name, position, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        tree.name,
                        section.name(),
                        entity.name(),
                        e_pos as i64,
                        entity.created_at.map(|d| d.to_rfc3339()),
                    ],
                )?;

                for (a_pos, attr) in entity.attributes().enumerate() {
                    tx.execute(
                        "INSERT INTO attributes
                             (wiki, section, entity, name, position, attribute_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            tree.name,
                            section.name(),
                            entity.name(),
                            attr.name(),
                            a_pos as i64,
                            serde_json::to_string(attr)?,
                        ],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load(&self, name: &str) -> StorageResult<Option<StoredWiki>> {
        let conn = self.lock()?;

        let session_json: Option<String> = conn
            .query_row(
                "SELECT session_json FROM wikis WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        let Some(session_json) = session_json else {
            return Ok(None);
        };
        let session: SessionState = serde_json::from_str(&session_json)?;

        let mut tree = KnowledgeTree::new(name);
        for section in Self::load_sections(&conn, name)? {
            tree.add_section(section)
                .map_err(|e| StorageError::Corrupt(format!("wiki '{}': {}", name, e)))?;
        }

        Ok(Some((tree, session)))
    }

    fn delete(&self, name: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM wikis WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM wikis ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
