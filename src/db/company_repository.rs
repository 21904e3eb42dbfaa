use super::models::CompanyRow;
use super::timestamp;
use crate::errors::Error;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A researched company and the recruiter conversation attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Company name, unique
    pub name: String,
    /// Opaque research details
    pub details: Value,
    /// Recruiter message the research started from, if any
    pub initial_message: Option<String>,
    /// Drafted reply, empty until generated
    #[serde(default)]
    pub reply_message: String,
}

impl Company {
    /// Creates a company record with no drafted reply
    pub fn new(name: impl Into<String>, details: Value, initial_message: Option<String>) -> Self {
        Self {
            name: name.into(),
            details,
            initial_message,
            reply_message: String::new(),
        }
    }
}

/// Repository for researched companies
pub struct CompanyRepository<'a> {
    /// Database connection
    pub conn: &'a mut SqliteConnection,
}

impl<'a> CompanyRepository<'a> {
    /// Creates a new CompanyRepository instance
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        CompanyRepository { conn }
    }

    /// Looks a company up by name
    pub fn get(&mut self, company_name: &str) -> Result<Option<Company>, Error> {
        use crate::schema::companies::dsl::*;

        companies
            .filter(name.eq(company_name))
            .select(CompanyRow::as_select())
            .first(self.conn)
            .optional()?
            .map(row_to_company)
            .transpose()
    }

    /// Lists every company ordered by name
    pub fn list(&mut self) -> Result<Vec<Company>, Error> {
        use crate::schema::companies::dsl::*;

        companies
            .order(name.asc())
            .select(CompanyRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(row_to_company)
            .collect()
    }

    /// Inserts a new company
    ///
    /// # Errors
    ///
    /// Returns `Error::CompanyExists` if a company with this name is stored
    pub fn create(&mut self, company: &Company) -> Result<(), Error> {
        use crate::schema::companies;

        let now = timestamp();
        let row = CompanyRow {
            name: company.name.clone(),
            details: serde_json::to_string(&company.details)?,
            initial_message: company.initial_message.clone(),
            reply_message: company.reply_message.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.conn.immediate_transaction(|conn| {
            let exists = companies::table
                .filter(companies::name.eq(&row.name))
                .count()
                .get_result::<i64>(conn)?
                > 0;
            if exists {
                return Err(Error::CompanyExists(row.name.clone()));
            }
            diesel::insert_into(companies::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
    }

    /// Replaces the stored details, message and reply of an existing company
    ///
    /// # Errors
    ///
    /// Returns `Error::CompanyNotFound` if the company is not stored
    pub fn update(&mut self, company: &Company) -> Result<(), Error> {
        use crate::schema::companies;

        let updated = diesel::update(companies::table.filter(companies::name.eq(&company.name)))
            .set((
                companies::details.eq(serde_json::to_string(&company.details)?),
                companies::initial_message.eq(company.initial_message.as_deref()),
                companies::reply_message.eq(&company.reply_message),
                companies::updated_at.eq(timestamp()),
            ))
            .execute(self.conn)?;

        if updated == 0 {
            return Err(Error::CompanyNotFound(company.name.clone()));
        }
        Ok(())
    }

    /// Deletes a company
    ///
    /// # Errors
    ///
    /// Returns `Error::CompanyNotFound` if the company is not stored
    pub fn delete(&mut self, company_name: &str) -> Result<(), Error> {
        use crate::schema::companies::dsl::*;

        let deleted = diesel::delete(companies.filter(name.eq(company_name))).execute(self.conn)?;
        if deleted == 0 {
            return Err(Error::CompanyNotFound(company_name.to_string()));
        }
        Ok(())
    }
}

fn row_to_company(row: CompanyRow) -> Result<Company, Error> {
    Ok(Company {
        name: row.name,
        details: serde_json::from_str(&row.details)?,
        initial_message: row.initial_message,
        reply_message: row.reply_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    #[test]
    fn create_get_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("jobs.db").to_str().unwrap()).unwrap();
        let mut conn = db.get_conn().unwrap();
        let mut repo = CompanyRepository::new(&mut conn);

        let mut acme = Company::new("Acme", json!({"url": "https://acme.test"}), None);
        repo.create(&acme).unwrap();
        assert!(matches!(repo.create(&acme), Err(Error::CompanyExists(_))));

        acme.reply_message = "Thanks!".to_string();
        repo.update(&acme).unwrap();
        assert_eq!(repo.get("Acme").unwrap(), Some(acme.clone()));
        assert_eq!(repo.list().unwrap().len(), 1);

        repo.delete("Acme").unwrap();
        assert_eq!(repo.get("Acme").unwrap(), None);
        assert!(matches!(repo.delete("Acme"), Err(Error::CompanyNotFound(_))));
        assert!(matches!(repo.update(&acme), Err(Error::CompanyNotFound(_))));
    }
}
