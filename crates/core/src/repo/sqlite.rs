//! SQLite-backed repository implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{FilterRepo, NetworkRepo, ReleaseQuery, ReleaseRepo, RepoError};
use crate::domain::{IrcChannel, IrcNetwork, NickServ};
use crate::filter::Filter;
use crate::release::{Release, ReleaseActionStatus, ReleaseStatus};

/// Single-connection SQLite repository behind a mutex.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) the database file and run the schema.
    pub fn new(path: &Path) -> Result<Self, RepoError> {
        let conn = Connection::open(path).map_err(|e| RepoError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory repository (useful for testing).
    pub fn in_memory() -> Result<Self, RepoError> {
        let conn = Connection::open_in_memory().map_err(|e| RepoError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RepoError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS irc_network (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 0,
                server TEXT NOT NULL,
                port INTEGER NOT NULL,
                tls INTEGER NOT NULL DEFAULT 0,
                pass TEXT,
                invite_command TEXT,
                nickserv_account TEXT NOT NULL,
                nickserv_password TEXT
            );

            CREATE TABLE IF NOT EXISTS irc_channel (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network_id INTEGER NOT NULL
                    REFERENCES irc_network(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                password TEXT,
                detached INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS filter (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS releases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                indexer TEXT NOT NULL,
                torrent_name TEXT NOT NULL,
                category TEXT,
                year TEXT,
                tags TEXT,
                size_bytes INTEGER,
                freeleech INTEGER NOT NULL DEFAULT 0,
                download_url TEXT NOT NULL,
                vars TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS release_action_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                release_id INTEGER NOT NULL
                    REFERENCES releases(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                filter TEXT,
                client TEXT,
                rejections TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_irc_channel_network
                ON irc_channel(network_id);
            CREATE INDEX IF NOT EXISTS idx_releases_indexer_name
                ON releases(indexer, torrent_name);
            CREATE INDEX IF NOT EXISTS idx_status_release
                ON release_action_status(release_id);
            "#,
        )
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_network(row: &rusqlite::Row) -> rusqlite::Result<IrcNetwork> {
        Ok(IrcNetwork {
            id: row.get(0)?,
            name: row.get(1)?,
            enabled: row.get(2)?,
            server: row.get(3)?,
            port: row.get(4)?,
            tls: row.get(5)?,
            pass: row.get(6)?,
            invite_command: row.get(7)?,
            nickserv: NickServ {
                account: row.get(8)?,
                password: row.get(9)?,
            },
            channels: Vec::new(),
        })
    }

    fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<IrcChannel> {
        Ok(IrcChannel {
            id: row.get(0)?,
            name: row.get(1)?,
            enabled: row.get(2)?,
            password: row.get(3)?,
            detached: row.get(4)?,
        })
    }

    fn row_to_release(row: &rusqlite::Row) -> rusqlite::Result<Release> {
        let vars_json: String = row.get(9)?;
        let timestamp_str: String = row.get(10)?;

        Ok(Release {
            id: row.get(0)?,
            indexer: row.get(1)?,
            torrent_name: row.get(2)?,
            category: row.get(3)?,
            year: row.get(4)?,
            tags: row.get(5)?,
            size_bytes: row.get::<_, Option<i64>>(6)?.map(|s| s.max(0) as u64),
            freeleech: row.get(7)?,
            download_url: row.get(8)?,
            vars: serde_json::from_str(&vars_json).unwrap_or_default(),
            timestamp: parse_timestamp(&timestamp_str),
        })
    }

    fn channels_for(conn: &Connection, network_id: i64) -> Result<Vec<IrcChannel>, RepoError> {
        let mut stmt = conn.prepare(
            "SELECT id, name, enabled, password, detached FROM irc_channel
             WHERE network_id = ?1 ORDER BY id",
        )?;
        let channels = stmt
            .query_map(params![network_id], Self::row_to_channel)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    fn networks_where(
        conn: &Connection,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<IrcNetwork>, RepoError> {
        let sql = format!(
            "SELECT id, name, enabled, server, port, tls, pass, invite_command,
                    nickserv_account, nickserv_password
             FROM irc_network {} ORDER BY id",
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut networks = stmt
            .query_map(params, Self::row_to_network)?
            .collect::<Result<Vec<_>, _>>()?;

        for network in &mut networks {
            network.channels = Self::channels_for(conn, network.id)?;
        }
        Ok(networks)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width so string comparison in SQL matches time order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl NetworkRepo for SqliteRepo {
    fn find_active_networks(&self) -> Result<Vec<IrcNetwork>, RepoError> {
        let conn = self.conn.lock().unwrap();
        Self::networks_where(&conn, "WHERE enabled = 1", &[])
    }

    fn list_networks(&self) -> Result<Vec<IrcNetwork>, RepoError> {
        let conn = self.conn.lock().unwrap();
        Self::networks_where(&conn, "", &[])
    }

    fn get_network_by_id(&self, id: i64) -> Result<Option<IrcNetwork>, RepoError> {
        let conn = self.conn.lock().unwrap();
        let mut networks =
            Self::networks_where(&conn, "WHERE id = ?1", &[&id as &dyn rusqlite::ToSql])?;
        Ok(networks.pop())
    }

    fn store_network(&self, network: &mut IrcNetwork) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO irc_network
                (name, enabled, server, port, tls, pass, invite_command,
                 nickserv_account, nickserv_password)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                network.name,
                network.enabled,
                network.server,
                network.port,
                network.tls,
                network.pass,
                network.invite_command,
                network.nickserv.account,
                network.nickserv.password,
            ],
        )?;
        network.id = conn.last_insert_rowid();

        for channel in &mut network.channels {
            conn.execute(
                "INSERT INTO irc_channel (network_id, name, enabled, password, detached)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    network.id,
                    channel.name,
                    channel.enabled,
                    channel.password,
                    channel.detached,
                ],
            )?;
            channel.id = conn.last_insert_rowid();
        }

        Ok(())
    }

    fn update_network(&self, network: &IrcNetwork) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE irc_network SET
                name = ?1, enabled = ?2, server = ?3, port = ?4, tls = ?5,
                pass = ?6, invite_command = ?7, nickserv_account = ?8,
                nickserv_password = ?9
             WHERE id = ?10",
            params![
                network.name,
                network.enabled,
                network.server,
                network.port,
                network.tls,
                network.pass,
                network.invite_command,
                network.nickserv.account,
                network.nickserv.password,
                network.id,
            ],
        )?;

        if updated == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    fn delete_network(&self, id: i64) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM irc_network WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    fn check_existing_network(
        &self,
        network: &IrcNetwork,
    ) -> Result<Option<IrcNetwork>, RepoError> {
        let conn = self.conn.lock().unwrap();
        let mut networks = Self::networks_where(
            &conn,
            "WHERE server = ?1 AND nickserv_account = ?2",
            &[
                &network.server as &dyn rusqlite::ToSql,
                &network.nickserv.account,
            ],
        )?;
        Ok(networks.pop())
    }

    fn list_channels(&self, network_id: i64) -> Result<Vec<IrcChannel>, RepoError> {
        let conn = self.conn.lock().unwrap();
        Self::channels_for(&conn, network_id)
    }

    fn store_channel(&self, network_id: i64, channel: &mut IrcChannel) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO irc_channel (network_id, name, enabled, password, detached)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                network_id,
                channel.name,
                channel.enabled,
                channel.password,
                channel.detached,
            ],
        )?;
        channel.id = conn.last_insert_rowid();
        Ok(())
    }

    fn store_network_channels(
        &self,
        network_id: i64,
        channels: &[IrcChannel],
    ) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM irc_channel WHERE network_id = ?1",
            params![network_id],
        )?;
        for channel in channels {
            conn.execute(
                "INSERT INTO irc_channel (network_id, name, enabled, password, detached)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    network_id,
                    channel.name,
                    channel.enabled,
                    channel.password,
                    channel.detached,
                ],
            )?;
        }
        Ok(())
    }
}

impl FilterRepo for SqliteRepo {
    fn list_filters(&self) -> Result<Vec<Filter>, RepoError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, data FROM filter ORDER BY priority DESC, name ASC",
        )?;
        let filters = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let data: String = row.get(1)?;
                Ok((id, data))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(id, data)| {
                let mut filter: Filter = serde_json::from_str(&data).ok()?;
                filter.id = id;
                Some(filter)
            })
            .collect();
        Ok(filters)
    }

    fn get_filter(&self, id: i64) -> Result<Option<Filter>, RepoError> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row("SELECT data FROM filter WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(data.and_then(|d| {
            let mut filter: Filter = serde_json::from_str(&d).ok()?;
            filter.id = id;
            Some(filter)
        }))
    }

    fn store_filter(&self, filter: &mut Filter) -> Result<(), RepoError> {
        let data =
            serde_json::to_string(filter).map_err(|e| RepoError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO filter (name, enabled, priority, data) VALUES (?1, ?2, ?3, ?4)",
            params![filter.name, filter.enabled, filter.priority, data],
        )?;
        filter.id = conn.last_insert_rowid();
        Ok(())
    }

    fn update_filter(&self, filter: &Filter) -> Result<(), RepoError> {
        let data =
            serde_json::to_string(filter).map_err(|e| RepoError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE filter SET name = ?1, enabled = ?2, priority = ?3, data = ?4 WHERE id = ?5",
            params![filter.name, filter.enabled, filter.priority, data, filter.id],
        )?;
        if updated == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    fn delete_filter(&self, id: i64) -> Result<(), RepoError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM filter WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

impl ReleaseRepo for SqliteRepo {
    fn store_release(&self, release: &Release) -> Result<i64, RepoError> {
        let vars =
            serde_json::to_string(&release.vars).map_err(|e| RepoError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO releases
                (indexer, torrent_name, category, year, tags, size_bytes,
                 freeleech, download_url, vars, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                release.indexer,
                release.torrent_name,
                release.category,
                release.year,
                release.tags,
                release.size_bytes.map(|s| s as i64),
                release.freeleech,
                release.download_url,
                vars,
                format_timestamp(&release.timestamp),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn append_status(
        &self,
        release_id: i64,
        status: ReleaseStatus,
        filter: Option<&str>,
        client: Option<&str>,
        rejections: &[String],
    ) -> Result<(), RepoError> {
        let rejections =
            serde_json::to_string(rejections).map_err(|e| RepoError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO release_action_status
                (release_id, status, filter, client, rejections, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                release_id,
                status.as_str(),
                filter,
                client,
                rejections,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn list_statuses(&self, release_id: i64) -> Result<Vec<ReleaseActionStatus>, RepoError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, release_id, status, filter, client, rejections, timestamp
             FROM release_action_status WHERE release_id = ?1 ORDER BY id",
        )?;
        let statuses = stmt
            .query_map(params![release_id], |row| {
                let status_str: String = row.get(2)?;
                let rejections_json: String = row.get(5)?;
                let timestamp_str: String = row.get(6)?;
                Ok(ReleaseActionStatus {
                    id: row.get(0)?,
                    release_id: row.get(1)?,
                    status: ReleaseStatus::parse(&status_str)
                        .unwrap_or(ReleaseStatus::Pending),
                    filter: row.get(3)?,
                    client: row.get(4)?,
                    rejections: serde_json::from_str(&rejections_json).unwrap_or_default(),
                    timestamp: parse_timestamp(&timestamp_str),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    fn has_recent_terminal_status(
        &self,
        indexer: &str,
        torrent_name: &str,
        window: Duration,
    ) -> Result<bool, RepoError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM release_action_status s
             JOIN releases r ON r.id = s.release_id
             WHERE r.indexer = ?1 AND r.torrent_name = ?2
               AND s.status IN ('PUSH_APPROVED', 'PUSH_REJECTED', 'FILTER_REJECTED')
               AND s.timestamp >= ?3",
            params![indexer, torrent_name, format_timestamp(&cutoff)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn query_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>, RepoError> {
        let (where_clause, params) = release_where_clause(query);
        let sql = format!(
            "SELECT r.id, r.indexer, r.torrent_name, r.category, r.year, r.tags,
                    r.size_bytes, r.freeleech, r.download_url, r.vars, r.timestamp
             FROM releases r {} ORDER BY r.id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            params.len() + 1,
            params.len() + 2,
        );

        let limit = if query.limit == 0 { 50 } else { query.limit } as i64;
        let offset = query.offset as i64;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p.as_ref() as &dyn rusqlite::ToSql).collect();
        bound.push(&limit);
        bound.push(&offset);

        let releases = stmt
            .query_map(bound.as_slice(), Self::row_to_release)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(releases)
    }

    fn count_releases(&self, query: &ReleaseQuery) -> Result<u64, RepoError> {
        let (where_clause, params) = release_where_clause(query);
        let sql = format!("SELECT COUNT(*) FROM releases r {}", where_clause);

        let conn = self.conn.lock().unwrap();
        let bound: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p.as_ref() as &dyn rusqlite::ToSql).collect();
        let count: i64 = conn.query_row(&sql, bound.as_slice(), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn release_where_clause(query: &ReleaseQuery) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref indexer) = query.indexer {
        params.push(Box::new(indexer.clone()));
        conditions.push(format!("r.indexer = ?{}", params.len()));
    }

    if let Some(status) = query.action_status {
        params.push(Box::new(status.as_str()));
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM release_action_status s
                     WHERE s.release_id = r.id AND s.status = ?{})",
            params.len()
        ));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, params)
}
