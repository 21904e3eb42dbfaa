use super::models::CacheEntryRow;
use super::timestamp;
use crate::errors::Error;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// Repository for memoized stage results
pub struct CacheRepository<'a> {
    /// Database connection
    pub conn: &'a mut SqliteConnection,
}

impl<'a> CacheRepository<'a> {
    /// Creates a new CacheRepository instance
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        CacheRepository { conn }
    }

    /// Returns the serialized value stored under the key, if any
    pub fn get(
        &mut self,
        the_stage: i32,
        the_function: &str,
        the_fingerprint: &str,
    ) -> Result<Option<String>, Error> {
        use crate::schema::cache_entries::dsl::*;

        Ok(cache_entries
            .filter(stage.eq(the_stage))
            .filter(function_name.eq(the_function))
            .filter(fingerprint.eq(the_fingerprint))
            .select(value)
            .first::<String>(self.conn)
            .optional()?)
    }

    /// Stores a serialized value, replacing any previous entry for the key
    pub fn set(
        &mut self,
        the_stage: i32,
        the_function: &str,
        the_fingerprint: &str,
        the_value: &str,
    ) -> Result<(), Error> {
        use crate::schema::cache_entries;

        let row = CacheEntryRow {
            stage: the_stage,
            function_name: the_function.to_string(),
            fingerprint: the_fingerprint.to_string(),
            value: the_value.to_string(),
            created_at: timestamp(),
        };
        diesel::replace_into(cache_entries::table)
            .values(&row)
            .execute(self.conn)?;
        Ok(())
    }

    /// Deletes one entry; returns whether it existed
    pub fn delete(
        &mut self,
        the_stage: i32,
        the_function: &str,
        the_fingerprint: &str,
    ) -> Result<bool, Error> {
        use crate::schema::cache_entries::dsl::*;

        let deleted = diesel::delete(
            cache_entries
                .filter(stage.eq(the_stage))
                .filter(function_name.eq(the_function))
                .filter(fingerprint.eq(the_fingerprint)),
        )
        .execute(self.conn)?;
        Ok(deleted > 0)
    }

    /// Deletes every entry of one stage; returns the number removed
    pub fn delete_stage(&mut self, the_stage: i32) -> Result<usize, Error> {
        use crate::schema::cache_entries::dsl::*;

        Ok(diesel::delete(cache_entries.filter(stage.eq(the_stage))).execute(self.conn)?)
    }

    /// Deletes every entry; returns the number removed
    pub fn clear(&mut self) -> Result<usize, Error> {
        use crate::schema::cache_entries::dsl::*;

        Ok(diesel::delete(cache_entries).execute(self.conn)?)
    }

    /// Number of stored entries
    pub fn count(&mut self) -> Result<i64, Error> {
        use crate::schema::cache_entries::dsl::*;

        Ok(cache_entries.count().get_result(self.conn)?)
    }
}
