use serenity::model::id::{GuildId, UserId};
use sqlx::FromRow;

use super::{from_db, to_db, Store};
use crate::model::{Character, CharacterId, NewCharacter};

const CHARACTER_COLUMNS: &str = "id, server_id, owner_id, name, nickname, summary, description, \
     avatar_url, pronouns, is_current";

#[derive(Debug, FromRow)]
struct CharacterRow {
    id: i64,
    server_id: i64,
    owner_id: i64,
    name: String,
    nickname: Option<String>,
    summary: String,
    description: String,
    avatar_url: Option<String>,
    pronouns: String,
    is_current: bool,
}

impl From<CharacterRow> for Character {
    fn from(row: CharacterRow) -> Self {
        Character {
            id: row.id,
            server_id: GuildId(from_db(row.server_id)),
            owner_id: UserId(from_db(row.owner_id)),
            name: row.name,
            nickname: row.nickname,
            summary: row.summary,
            description: row.description,
            avatar_url: row.avatar_url,
            pronouns: row.pronouns,
            is_current: row.is_current,
        }
    }
}

impl Store {
    pub async fn insert_character(&self, new: &NewCharacter) -> Result<Character, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO characters (server_id, owner_id, name, nickname, summary, avatar_url)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_db(new.server_id.0))
        .bind(to_db(new.owner_id.0))
        .bind(&new.name)
        .bind(&new.nickname)
        .bind(&new.summary)
        .bind(&new.avatar_url)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Character {
            id,
            server_id: new.server_id,
            owner_id: new.owner_id,
            name: new.name.clone(),
            nickname: new.nickname.clone(),
            summary: new.summary.clone(),
            description: String::new(),
            avatar_url: new.avatar_url.clone(),
            pronouns: String::new(),
            is_current: false,
        })
    }

    /// Look up one of `owner_id`'s characters by name, ignoring case.
    pub async fn character_by_name(
        &self,
        server_id: GuildId,
        owner_id: UserId,
        name: &str,
    ) -> Result<Option<Character>, sqlx::Error> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "SELECT {} FROM characters \
             WHERE server_id = ? AND owner_id = ? AND name = ? COLLATE NOCASE",
            CHARACTER_COLUMNS
        ))
        .bind(to_db(server_id.0))
        .bind(to_db(owner_id.0))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Character::from))
    }

    pub async fn characters(
        &self,
        server_id: GuildId,
        owner_id: UserId,
    ) -> Result<Vec<Character>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CharacterRow>(&format!(
            "SELECT {} FROM characters WHERE server_id = ? AND owner_id = ? \
             ORDER BY name COLLATE NOCASE",
            CHARACTER_COLUMNS
        ))
        .bind(to_db(server_id.0))
        .bind(to_db(owner_id.0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Character::from).collect())
    }

    pub async fn current_character(
        &self,
        server_id: GuildId,
        owner_id: UserId,
    ) -> Result<Option<Character>, sqlx::Error> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "SELECT {} FROM characters WHERE server_id = ? AND owner_id = ? AND is_current = 1",
            CHARACTER_COLUMNS
        ))
        .bind(to_db(server_id.0))
        .bind(to_db(owner_id.0))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Character::from))
    }

    /// Make `character_id` the owner's only current character, or clear it when `None`.
    pub async fn set_current_character(
        &self,
        server_id: GuildId,
        owner_id: UserId,
        character_id: Option<CharacterId>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE characters SET is_current = 0 WHERE server_id = ? AND owner_id = ?")
            .bind(to_db(server_id.0))
            .bind(to_db(owner_id.0))
            .execute(&mut *tx)
            .await?;
        if let Some(id) = character_id {
            sqlx::query("UPDATE characters SET is_current = 1 WHERE id = ? AND owner_id = ?")
                .bind(id)
                .bind(to_db(owner_id.0))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    pub async fn update_character(&self, character: &Character) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE characters SET
                owner_id = ?, name = ?, nickname = ?, summary = ?, description = ?,
                avatar_url = ?, pronouns = ?, is_current = ?
            WHERE id = ?
            "#,
        )
        .bind(to_db(character.owner_id.0))
        .bind(&character.name)
        .bind(&character.nickname)
        .bind(&character.summary)
        .bind(&character.description)
        .bind(&character.avatar_url)
        .bind(&character.pronouns)
        .bind(character.is_current)
        .bind(character.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_character(&self, id: CharacterId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM characters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
