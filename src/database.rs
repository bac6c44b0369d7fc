//! # SQLite Storage
//!
//! Persistence for contacts, templates, the activity log and follow-up schedules.
//! A single connection sits behind an async mutex; every method holds it only for
//! the statements it runs.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Initial schema with partial unique index for one active follow-up per contact

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::models::{
    ActivityEntry, ActivityType, Contact, ContactStatus, FollowUpSchedule, NewContact,
    NewTemplate, Template,
};

/// Timestamp format used for every stored time (UTC)
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS contacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        university TEXT NOT NULL DEFAULT '',
        department TEXT,
        research_interest TEXT,
        website TEXT,
        status TEXT NOT NULL DEFAULT 'new',
        last_contacted_at TEXT,
        follow_up_at TEXT,
        reply_received_at TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status);

    CREATE TABLE IF NOT EXISTS templates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL,
        use_ai_personalization INTEGER NOT NULL DEFAULT 0,
        is_default INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS activity_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INTEGER NOT NULL,
        template_id INTEGER,
        activity_type TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_activity_logs_contact ON activity_logs(contact_id);

    CREATE TABLE IF NOT EXISTS follow_ups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INTEGER NOT NULL,
        template_id INTEGER NOT NULL,
        due_at TEXT NOT NULL,
        fired INTEGER NOT NULL DEFAULT 0,
        fired_at TEXT,
        cancelled INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_follow_ups_due ON follow_ups(fired, due_at);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_follow_ups_active
        ON follow_ups(contact_id) WHERE fired = 0;
";

const CONTACT_COLUMNS: &str = "id, name, email, university, department, research_interest, website, \
     status, last_contacted_at, follow_up_at, reply_received_at";

const FOLLOW_UP_COLUMNS: &str =
    "id, contact_id, template_id, due_at, fired, fired_at, cancelled, created_at";

pub fn format_db_time(time: DateTime<Utc>) -> String {
    time.format(DB_TIME_FORMAT).to_string()
}

pub fn parse_db_time(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, DB_TIME_FORMAT)
        .with_context(|| format!("Invalid stored timestamp: {raw}"))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Activity row to append
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub contact_id: i64,
    pub template_id: Option<i64>,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`. `":memory:"` gives a private in-memory store.
    pub async fn new(path: &str) -> Result<Self> {
        let connection = sqlite::open(path)
            .with_context(|| format!("Failed to open database at {path}"))?;
        connection.execute(SCHEMA)?;

        info!("Database ready at {path}");

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    // Contacts

    pub async fn create_contact(&self, contact: &NewContact) -> Result<i64> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO contacts (name, email, university, department, research_interest, website, status)
             VALUES (?, ?, ?, ?, ?, ?, 'new')",
        )?;
        stmt.bind((1, contact.name.as_str()))?;
        stmt.bind((2, contact.email.as_str()))?;
        stmt.bind((3, contact.university.as_str()))?;
        stmt.bind((4, contact.department.as_deref()))?;
        stmt.bind((5, contact.research_interest.as_deref()))?;
        stmt.bind((6, contact.website.as_deref()))?;
        stmt.next()?;
        drop(stmt);

        let id = last_insert_id(&conn)?;
        debug!("Created contact {id} ({})", contact.email);
        Ok(id)
    }

    pub async fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"
        ))?;
        stmt.bind((1, id))?;

        if let State::Row = stmt.next()? {
            Ok(Some(read_contact(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// Write the mutable state fields of a contact (status and timestamps)
    pub async fn update_contact_state(&self, contact: &Contact) -> Result<()> {
        let last_contacted = contact.last_contacted_at.map(format_db_time);
        let follow_up = contact.follow_up_at.map(format_db_time);
        let reply_received = contact.reply_received_at.map(format_db_time);

        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE contacts
             SET status = ?, last_contacted_at = ?, follow_up_at = ?, reply_received_at = ?
             WHERE id = ?",
        )?;
        stmt.bind((1, contact.status.as_str()))?;
        stmt.bind((2, last_contacted.as_deref()))?;
        stmt.bind((3, follow_up.as_deref()))?;
        stmt.bind((4, reply_received.as_deref()))?;
        stmt.bind((5, contact.id))?;
        stmt.next()?;
        drop(stmt);

        if conn.change_count() == 0 {
            anyhow::bail!("Contact {} no longer exists", contact.id);
        }
        Ok(())
    }

    /// Replace a contact's identity and affiliation fields. Returns false if no such contact.
    pub async fn update_contact_profile(&self, id: i64, profile: &NewContact) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE contacts
             SET name = ?, email = ?, university = ?, department = ?, research_interest = ?, website = ?
             WHERE id = ?",
        )?;
        stmt.bind((1, profile.name.as_str()))?;
        stmt.bind((2, profile.email.as_str()))?;
        stmt.bind((3, profile.university.as_str()))?;
        stmt.bind((4, profile.department.as_deref()))?;
        stmt.bind((5, profile.research_interest.as_deref()))?;
        stmt.bind((6, profile.website.as_deref()))?;
        stmt.bind((7, id))?;
        stmt.next()?;
        drop(stmt);

        Ok(conn.change_count() > 0)
    }

    /// Delete a contact. Refused while an unfired follow-up still references it.
    pub async fn delete_contact(&self, id: i64) -> Result<bool> {
        let conn = self.connection.lock().await;

        let mut check = conn.prepare(
            "SELECT COUNT(*) FROM follow_ups WHERE contact_id = ? AND fired = 0",
        )?;
        check.bind((1, id))?;
        check.next()?;
        let pending = check.read::<i64, _>(0)?;
        drop(check);

        if pending > 0 {
            anyhow::bail!("Contact {id} has a pending follow-up; cancel it before deleting");
        }

        let mut stmt = conn.prepare("DELETE FROM contacts WHERE id = ?")?;
        stmt.bind((1, id))?;
        stmt.next()?;
        drop(stmt);

        Ok(conn.change_count() > 0)
    }

    // Templates

    pub async fn create_template(&self, template: &NewTemplate) -> Result<i64> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO templates (name, subject, body, use_ai_personalization, is_default)
             VALUES (?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, template.name.as_str()))?;
        stmt.bind((2, template.subject.as_str()))?;
        stmt.bind((3, template.body.as_str()))?;
        stmt.bind((4, i64::from(template.use_ai_personalization)))?;
        stmt.bind((5, i64::from(template.is_default)))?;
        stmt.next()?;
        drop(stmt);

        last_insert_id(&conn)
    }

    pub async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, subject, body, use_ai_personalization, is_default
             FROM templates WHERE id = ?",
        )?;
        stmt.bind((1, id))?;

        if let State::Row = stmt.next()? {
            Ok(Some(read_template(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// The template flagged as default; the lowest id wins if several are flagged
    pub async fn get_default_template(&self) -> Result<Option<Template>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, subject, body, use_ai_personalization, is_default
             FROM templates WHERE is_default = 1 ORDER BY id LIMIT 1",
        )?;

        if let State::Row = stmt.next()? {
            Ok(Some(read_template(&stmt)?))
        } else {
            Ok(None)
        }
    }

    // Activity log

    pub async fn append_activity(&self, activity: &NewActivity) -> Result<i64> {
        let created_at = format_db_time(activity.created_at);

        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO activity_logs (contact_id, template_id, activity_type, title, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, activity.contact_id))?;
        stmt.bind((2, activity.template_id))?;
        stmt.bind((3, activity.activity_type.as_str()))?;
        stmt.bind((4, activity.title.as_str()))?;
        stmt.bind((5, activity.description.as_deref()))?;
        stmt.bind((6, created_at.as_str()))?;
        stmt.next()?;
        drop(stmt);

        last_insert_id(&conn)
    }

    /// A contact's activity, newest first
    pub async fn activity_for_contact(&self, contact_id: i64) -> Result<Vec<ActivityEntry>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, contact_id, template_id, activity_type, title, description, created_at
             FROM activity_logs WHERE contact_id = ? ORDER BY id DESC",
        )?;
        stmt.bind((1, contact_id))?;

        let mut entries = Vec::new();
        while let State::Row = stmt.next()? {
            entries.push(ActivityEntry {
                id: stmt.read::<i64, _>("id")?,
                contact_id: stmt.read::<i64, _>("contact_id")?,
                template_id: stmt.read::<Option<i64>, _>("template_id")?,
                activity_type: stmt.read::<String, _>("activity_type")?.parse()?,
                title: stmt.read::<String, _>("title")?,
                description: stmt.read::<Option<String>, _>("description")?,
                created_at: parse_db_time(&stmt.read::<String, _>("created_at")?)?,
            });
        }
        Ok(entries)
    }

    /// Count sent + failed entries, for one contact or across all contacts
    pub async fn count_dispatch_records(&self, contact_id: Option<i64>) -> Result<usize> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT COUNT(*) FROM activity_logs
             WHERE activity_type IN ('email_sent', 'email_failed')
               AND (?1 IS NULL OR contact_id = ?1)",
        )?;
        stmt.bind((1, contact_id))?;
        stmt.next()?;
        Ok(stmt.read::<i64, _>(0)? as usize)
    }

    // Follow-ups

    /// Replace the contact's active schedule (if any) with a new one, atomically
    pub async fn upsert_follow_up(
        &self,
        contact_id: i64,
        template_id: i64,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FollowUpSchedule> {
        let due = format_db_time(due_at);
        let created = format_db_time(now);

        let conn = self.connection.lock().await;
        conn.execute("BEGIN IMMEDIATE")?;

        let result = (|| -> Result<i64> {
            let mut supersede = conn.prepare(
                "UPDATE follow_ups SET fired = 1, fired_at = ?, cancelled = 1
                 WHERE contact_id = ? AND fired = 0",
            )?;
            supersede.bind((1, created.as_str()))?;
            supersede.bind((2, contact_id))?;
            supersede.next()?;
            let superseded = conn.change_count();
            drop(supersede);

            if superseded > 0 {
                debug!("Superseded {superseded} pending follow-up(s) for contact {contact_id}");
            }

            let mut insert = conn.prepare(
                "INSERT INTO follow_ups (contact_id, template_id, due_at, fired, cancelled, created_at)
                 VALUES (?, ?, ?, 0, 0, ?)",
            )?;
            insert.bind((1, contact_id))?;
            insert.bind((2, template_id))?;
            insert.bind((3, due.as_str()))?;
            insert.bind((4, created.as_str()))?;
            insert.next()?;
            drop(insert);

            last_insert_id(&conn)
        })();

        let id = match result {
            Ok(id) => {
                conn.execute("COMMIT")?;
                id
            }
            Err(e) => {
                conn.execute("ROLLBACK").ok();
                return Err(e);
            }
        };

        let mut stmt = conn.prepare(format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups WHERE id = ?"
        ))?;
        stmt.bind((1, id))?;
        stmt.next()?;
        read_follow_up(&stmt)
    }

    pub async fn get_active_follow_up(&self, contact_id: i64) -> Result<Option<FollowUpSchedule>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups WHERE contact_id = ? AND fired = 0"
        ))?;
        stmt.bind((1, contact_id))?;

        if let State::Row = stmt.next()? {
            Ok(Some(read_follow_up(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// Unfired schedules with `due_at <= now`, earliest first
    pub async fn get_due_follow_ups(&self, now: DateTime<Utc>) -> Result<Vec<FollowUpSchedule>> {
        let cutoff = format_db_time(now);

        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups
             WHERE fired = 0 AND due_at <= ?
             ORDER BY due_at, id"
        ))?;
        stmt.bind((1, cutoff.as_str()))?;

        let mut due = Vec::new();
        while let State::Row = stmt.next()? {
            due.push(read_follow_up(&stmt)?);
        }
        Ok(due)
    }

    /// Flip an unfired schedule to fired. Returns false if it was already fired.
    pub async fn mark_follow_up_fired(
        &self,
        id: i64,
        at: DateTime<Utc>,
        cancelled: bool,
    ) -> Result<bool> {
        let fired_at = format_db_time(at);

        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE follow_ups SET fired = 1, fired_at = ?, cancelled = ?
             WHERE id = ? AND fired = 0",
        )?;
        stmt.bind((1, fired_at.as_str()))?;
        stmt.bind((2, i64::from(cancelled)))?;
        stmt.bind((3, id))?;
        stmt.next()?;
        drop(stmt);

        Ok(conn.change_count() > 0)
    }

    /// Every schedule ever created for a contact, oldest first
    pub async fn follow_ups_for_contact(&self, contact_id: i64) -> Result<Vec<FollowUpSchedule>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(format!(
            "SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups WHERE contact_id = ? ORDER BY id"
        ))?;
        stmt.bind((1, contact_id))?;

        let mut schedules = Vec::new();
        while let State::Row = stmt.next()? {
            schedules.push(read_follow_up(&stmt)?);
        }
        Ok(schedules)
    }
}

fn last_insert_id(conn: &Connection) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT last_insert_rowid()")?;
    stmt.next()?;
    Ok(stmt.read::<i64, _>(0)?)
}

fn read_time(stmt: &Statement<'_>, column: &str) -> Result<Option<DateTime<Utc>>> {
    stmt.read::<Option<String>, _>(column)?
        .map(|raw| parse_db_time(&raw))
        .transpose()
}

fn read_contact(stmt: &Statement<'_>) -> Result<Contact> {
    let status: ContactStatus = stmt.read::<String, _>("status")?.parse()?;

    Ok(Contact {
        id: stmt.read::<i64, _>("id")?,
        name: stmt.read::<String, _>("name")?,
        email: stmt.read::<String, _>("email")?,
        university: stmt.read::<String, _>("university")?,
        department: stmt.read::<Option<String>, _>("department")?,
        research_interest: stmt.read::<Option<String>, _>("research_interest")?,
        website: stmt.read::<Option<String>, _>("website")?,
        status,
        last_contacted_at: read_time(stmt, "last_contacted_at")?,
        follow_up_at: read_time(stmt, "follow_up_at")?,
        reply_received_at: read_time(stmt, "reply_received_at")?,
    })
}

fn read_template(stmt: &Statement<'_>) -> Result<Template> {
    Ok(Template {
        id: stmt.read::<i64, _>("id")?,
        name: stmt.read::<String, _>("name")?,
        subject: stmt.read::<String, _>("subject")?,
        body: stmt.read::<String, _>("body")?,
        use_ai_personalization: stmt.read::<i64, _>("use_ai_personalization")? != 0,
        is_default: stmt.read::<i64, _>("is_default")? != 0,
    })
}

fn read_follow_up(stmt: &Statement<'_>) -> Result<FollowUpSchedule> {
    Ok(FollowUpSchedule {
        id: stmt.read::<i64, _>("id")?,
        contact_id: stmt.read::<i64, _>("contact_id")?,
        template_id: stmt.read::<i64, _>("template_id")?,
        due_at: parse_db_time(&stmt.read::<String, _>("due_at")?)?,
        fired: stmt.read::<i64, _>("fired")? != 0,
        fired_at: read_time(stmt, "fired_at")?,
        cancelled: stmt.read::<i64, _>("cancelled")? != 0,
        created_at: parse_db_time(&stmt.read::<String, _>("created_at")?)?,
    })
}
