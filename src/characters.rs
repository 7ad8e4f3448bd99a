//! Role-play characters.
//!
//! Each user may keep any number of characters per server and play as one of them at a time.
//! Playing a character changes the member's server nickname, best-effort.

use std::sync::Arc;

use serenity::model::id::{GuildId, UserId};

use crate::{
    model::{Character, CharacterId, NewCharacter},
    platform::Platform,
    store::Store,
    Error, Result,
};

/// Longest accepted character name.
pub const MAX_NAME_LENGTH: usize = 64;

/// Discord rejects longer nicknames.
const MAX_NICKNAME_LENGTH: usize = 32;

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid("Character names can't be empty."));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::invalid(format!(
            "Character names can be at most {} characters long.",
            MAX_NAME_LENGTH
        )));
    }
    if name.contains(':') {
        return Err(Error::invalid("Character names can't contain `:`."));
    }
    Ok(name.to_string())
}

fn validate_nickname(nickname: &str) -> Result<String> {
    let nickname = nickname.trim();
    if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_LENGTH {
        return Err(Error::invalid(format!(
            "Nicknames must be between 1 and {} characters long.",
            MAX_NICKNAME_LENGTH
        )));
    }
    Ok(nickname.to_string())
}

/// A field of a character that can be edited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterEdit {
    Summary(String),
    Description(String),
    Avatar(Option<String>),
    Pronouns(String),
    Nickname(Option<String>),
}

#[derive(Clone)]
pub struct Characters {
    store: Store,
    platform: Arc<dyn Platform>,
}

impl Characters {
    pub fn new(store: Store, platform: Arc<dyn Platform>) -> Self {
        Characters { store, platform }
    }

    /// One of `owner`'s characters, by name.
    pub async fn get(&self, server: GuildId, owner: UserId, name: &str) -> Result<Character> {
        self.store
            .character_by_name(server, owner, name.trim())
            .await?
            .ok_or_else(|| Error::not_found(format!("No character named \"{}\" found.", name)))
    }

    pub async fn list(&self, server: GuildId, owner: UserId) -> Result<Vec<Character>> {
        Ok(self.store.characters(server, owner).await?)
    }

    pub async fn current(&self, server: GuildId, owner: UserId) -> Result<Option<Character>> {
        Ok(self.store.current_character(server, owner).await?)
    }

    async fn ensure_unique(
        &self,
        server: GuildId,
        owner: UserId,
        name: &str,
        except: Option<CharacterId>,
    ) -> Result<()> {
        match self.store.character_by_name(server, owner, name).await? {
            Some(existing) if Some(existing.id) != except => Err(Error::conflict(format!(
                "A character named \"{}\" already exists.",
                existing.name
            ))),
            _ => Ok(()),
        }
    }

    pub async fn create(&self, mut new: NewCharacter) -> Result<Character> {
        new.name = validate_name(&new.name)?;
        new.nickname = new.nickname.as_deref().map(validate_nickname).transpose()?;
        self.ensure_unique(new.server_id, new.owner_id, &new.name, None)
            .await?;

        let character = self.store.insert_character(&new).await?;
        tracing::info!(
            character = %character.name,
            owner = %character.owner_id,
            server = %character.server_id,
            "created character"
        );
        Ok(character)
    }

    async fn apply_nickname(&self, server: GuildId, user: UserId, nickname: Option<&str>) {
        if let Err(error) = self.platform.set_nickname(server, user, nickname).await {
            tracing::warn!(%server, %user, error = ?error, "failed to change nickname");
        }
    }

    /// Start playing as `character`.
    pub async fn use_character(&self, character: &Character) -> Result<()> {
        self.store
            .set_current_character(character.server_id, character.owner_id, Some(character.id))
            .await?;
        self.apply_nickname(
            character.server_id,
            character.owner_id,
            Some(character.display_name()),
        )
        .await;
        Ok(())
    }

    /// Stop playing as any character.
    pub async fn clear(&self, server: GuildId, owner: UserId) -> Result<()> {
        self.store.set_current_character(server, owner, None).await?;
        self.apply_nickname(server, owner, None).await;
        Ok(())
    }

    pub async fn rename(&self, character: &mut Character, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        self.ensure_unique(
            character.server_id,
            character.owner_id,
            &name,
            Some(character.id),
        )
        .await?;
        character.name = name;
        self.store.update_character(character).await?;
        if character.is_current && character.nickname.is_none() {
            self.apply_nickname(character.server_id, character.owner_id, Some(&character.name))
                .await;
        }
        Ok(())
    }

    pub async fn edit(&self, character: &mut Character, edit: CharacterEdit) -> Result<()> {
        let renames = matches!(edit, CharacterEdit::Nickname(_));
        match edit {
            CharacterEdit::Summary(summary) => character.summary = summary.trim().to_string(),
            CharacterEdit::Description(description) => {
                character.description = description.trim().to_string()
            }
            CharacterEdit::Avatar(url) => character.avatar_url = url,
            CharacterEdit::Pronouns(pronouns) => character.pronouns = pronouns.trim().to_string(),
            CharacterEdit::Nickname(nickname) => {
                character.nickname = nickname.as_deref().map(validate_nickname).transpose()?
            }
        }
        self.store.update_character(character).await?;
        if renames && character.is_current {
            self.apply_nickname(
                character.server_id,
                character.owner_id,
                Some(character.display_name()),
            )
            .await;
        }
        Ok(())
    }

    pub async fn delete(&self, character: Character) -> Result<()> {
        self.store.delete_character(character.id).await?;
        if character.is_current {
            self.apply_nickname(character.server_id, character.owner_id, None)
                .await;
        }
        tracing::info!(character = %character.name, "deleted character");
        Ok(())
    }

    /// Give a character to another user. It stops being anyone's current character.
    pub async fn transfer(&self, character: &mut Character, new_owner: UserId) -> Result<()> {
        if new_owner == character.owner_id {
            return Err(Error::invalid("That user already owns the character."));
        }
        self.ensure_unique(character.server_id, new_owner, &character.name, None)
            .await?;

        let previous = character.owner_id;
        let was_current = character.is_current;
        character.owner_id = new_owner;
        character.is_current = false;
        self.store.update_character(character).await?;
        if was_current {
            self.apply_nickname(character.server_id, previous, None).await;
        }
        tracing::info!(
            character = %character.name,
            from = %previous,
            to = %new_owner,
            "transferred character"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;

    const SERVER: GuildId = GuildId(1);
    const OWNER: UserId = UserId(10);
    const OTHER: UserId = UserId(11);

    async fn setup() -> (Arc<FakePlatform>, Characters) {
        let store = Store::in_memory().await.unwrap();
        let platform = Arc::new(FakePlatform::new());
        (platform.clone(), Characters::new(store, platform))
    }

    fn new_character(owner: UserId, name: &str) -> NewCharacter {
        NewCharacter {
            server_id: SERVER,
            owner_id: owner,
            name: name.to_string(),
            nickname: None,
            summary: "A bard".to_string(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn names_are_validated() {
        let (_, characters) = setup().await;
        for bad in ["", "   ", "Aria:Bard", "a".repeat(65).as_str()] {
            assert!(matches!(
                characters.create(new_character(OWNER, bad)).await,
                Err(Error::Invalid(_))
            ));
        }
        characters
            .create(new_character(OWNER, "Aria"))
            .await
            .unwrap();
        assert!(matches!(
            characters.create(new_character(OWNER, "aria")).await,
            Err(Error::Conflict(_))
        ));
        // Names are only unique per owner
        characters
            .create(new_character(OTHER, "Aria"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn using_a_character_sets_the_nickname() {
        let (platform, characters) = setup().await;
        let aria = characters
            .create(new_character(OWNER, "Aria"))
            .await
            .unwrap();
        let mut brom = characters
            .create(new_character(OWNER, "Brom"))
            .await
            .unwrap();

        characters.use_character(&aria).await.unwrap();
        assert_eq!(
            platform.state.lock().unwrap().nicknames[&OWNER].as_deref(),
            Some("Aria")
        );

        characters.use_character(&brom).await.unwrap();
        let current = characters.current(SERVER, OWNER).await.unwrap().unwrap();
        assert_eq!(current.name, "Brom");

        brom.is_current = true;
        characters
            .edit(&mut brom, CharacterEdit::Nickname(Some("Bromley".to_string())))
            .await
            .unwrap();
        assert_eq!(
            platform.state.lock().unwrap().nicknames[&OWNER].as_deref(),
            Some("Bromley")
        );

        characters.clear(SERVER, OWNER).await.unwrap();
        assert!(characters.current(SERVER, OWNER).await.unwrap().is_none());
        assert_eq!(platform.state.lock().unwrap().nicknames[&OWNER], None);
    }

    #[tokio::test]
    async fn transfer_keeps_names_unique_for_the_new_owner() {
        let (_, characters) = setup().await;
        let mut aria = characters
            .create(new_character(OWNER, "Aria"))
            .await
            .unwrap();
        let taken = characters
            .create(new_character(OTHER, "Aria"))
            .await
            .unwrap();

        assert!(matches!(
            characters.transfer(&mut aria, OTHER).await,
            Err(Error::Conflict(_))
        ));
        characters.delete(taken).await.unwrap();

        characters.transfer(&mut aria, OTHER).await.unwrap();
        assert_eq!(characters.get(SERVER, OTHER, "aria").await.unwrap().id, aria.id);
        assert!(characters.list(SERVER, OWNER).await.unwrap().is_empty());
    }
}
