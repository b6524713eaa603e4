use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use rise_core::domain::contact::ContactRequest;

use super::{ContactRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactRecord {
    pub id: i64,
    #[serde(flatten)]
    pub contact: ContactRequest,
    pub created_at: DateTime<Utc>,
}

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for SqlContactRepository {
    async fn save(&self, contact: ContactRequest) -> Result<ContactRecord, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO contact (name, company_web, email, phone, topic, description, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&contact.name)
        .bind(&contact.company_web)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.topic)
        .bind(&contact.description)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ContactRecord { id: result.last_insert_rowid(), contact, created_at })
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ContactRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, company_web, email, phone, topic, description, created_at \
             FROM contact ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(contact_from_row).collect()
    }
}

fn contact_from_row(row: &SqliteRow) -> Result<ContactRecord, RepositoryError> {
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| RepositoryError::Decode(format!("created_at `{created_at}`: {e}")))?
        .with_timezone(&Utc);

    Ok(ContactRecord {
        id: row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        contact: ContactRequest {
            name: row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?,
            company_web: row
                .try_get("company_web")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            email: row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?,
            phone: row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?,
            topic: row.try_get("topic").map_err(|e| RepositoryError::Decode(e.to_string()))?,
            description: row
                .try_get("description")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        },
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use rise_core::domain::contact::ContactRequest;

    use super::SqlContactRepository;
    use crate::repositories::ContactRepository;
    use crate::{connect_with_settings, migrations};

    fn request(name: &str) -> ContactRequest {
        ContactRequest {
            name: name.to_string(),
            company_web: None,
            email: format!("{}@example.com", name.to_lowercase()),
            phone: Some("+1 555 0100".to_string()),
            topic: Some("test drive".to_string()),
            description: Some("Saturday morning works best".to_string()),
        }
    }

    #[tokio::test]
    async fn saved_contacts_are_listed_newest_first() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlContactRepository::new(pool);

        let first = repo.save(request("Ada")).await.expect("save ada");
        let second = repo.save(request("Grace")).await.expect("save grace");

        let listed = repo.list_recent(10).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].contact, first.contact);
        assert_eq!(listed[1].contact.phone.as_deref(), Some("+1 555 0100"));

        assert_eq!(repo.list_recent(1).await.expect("limited").len(), 1);
    }
}
