//! Persona operations.
//!
//! Personas ride on the character endpoints: creation goes through
//! `chat/character/create/` and both editing and deletion go through
//! `chat/persona/update/` (deletion is an archive-flagged update).

use serde_json::{json, Value};
use uuid::Uuid;

use crate::client::Client;
use crate::error::{Error, Result};

pub struct PersonaMethods<'a> {
    client: &'a Client,
}

impl<'a> PersonaMethods<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Fetches one persona by id.
    pub async fn fetch_persona(&self, persona_id: &str) -> Result<Value> {
        let response = self
            .client
            .get(&format!("{}/chat/persona/?id={persona_id}", self.client.plus_base()))
            .await?;
        if response.status_code == 200 {
            if let Some(persona) = response.json()?.get("persona") {
                if !persona.is_null() {
                    return Ok(persona.clone());
                }
            }
        }
        Err(Error::Fetch(
            "cannot fetch persona; maybe it does not exist?".into(),
        ))
    }

    /// Fetches every persona owned by the account.
    pub async fn fetch_personas(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&format!("{}/chat/personas/?force_refresh=1", self.client.plus_base()))
            .await?;
        if response.status_code == 200 {
            let personas = response
                .json()?
                .get("personas")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return Ok(personas);
        }
        Err(Error::Fetch("cannot fetch your personas".into()))
    }

    /// Creates a private persona.
    ///
    /// Name must be 3–20 characters; slogan at most 50, definition at most
    /// 32000, description at most 500, greeting at most 2048.
    pub async fn create_persona(
        &self,
        name: &str,
        slogan: &str,
        description: &str,
        greeting: &str,
        definition: &str,
    ) -> Result<Value> {
        if name.len() < 3 || name.len() > 20 {
            return Err(Error::InvalidArgument(
                "name must be at least 3 characters and no more than 20".into(),
            ));
        }
        if slogan.len() > 50 {
            return Err(Error::InvalidArgument(
                "slogan must be no more than 50 characters".into(),
            ));
        }
        if definition.len() > 32000 {
            return Err(Error::InvalidArgument(
                "definition must be no more than 32000 characters".into(),
            ));
        }
        if description.len() > 500 {
            return Err(Error::InvalidArgument(
                "description must be no more than 500 characters".into(),
            ));
        }
        if greeting.len() > 2048 {
            return Err(Error::InvalidArgument(
                "greeting must be no more than 2048 characters".into(),
            ));
        }

        let body = json!({
            "title": slogan,
            "name": name,
            "identifier": format!("id:{}", Uuid::new_v4()),
            "categories": [],
            "visibility": "PRIVATE",
            "copyable": false,
            "description": description,
            "greeting": greeting,
            "definition": definition,
            "avatar_rel_path": "",
            "img_gen_enabled": false,
            "base_img_prompt": "",
            "strip_img_prompt_from_msg": false,
            "voice_id": "",
            "default_voice_id": "",
        });

        let response = self
            .client
            .post(&format!("{}/chat/character/create/", self.client.plus_base()), &body)
            .await?;
        let payload = response.json()?;
        if response.status_code == 200 {
            if payload.get("status").and_then(Value::as_str) == Some("OK") {
                if let Some(character) = payload.get("character") {
                    if !character.is_null() {
                        return Ok(character.clone());
                    }
                }
            }
            return Err(Error::Create(format!(
                "cannot create persona: {}",
                payload.get("error").and_then(Value::as_str).unwrap_or("unknown error")
            )));
        }
        Err(Error::Create(format!(
            "cannot create persona; status {}",
            response.status_code
        )))
    }

    /// Edits a persona. `None` fields keep their current value.
    ///
    /// Name must be 3–20 characters; definition at most 728, description at
    /// most 498, greeting at most 2047.
    pub async fn edit_persona(
        &self,
        persona_id: &str,
        name: Option<&str>,
        definition: Option<&str>,
        description: Option<&str>,
        greeting: Option<&str>,
        avatar_rel_path: Option<&str>,
    ) -> Result<Value> {
        if let Some(name) = name {
            if name.len() < 3 || name.len() > 20 {
                return Err(Error::InvalidArgument(
                    "name must be at least 3 characters and no more than 20".into(),
                ));
            }
        }
        if let Some(definition) = definition {
            if definition.len() > 728 {
                return Err(Error::InvalidArgument(
                    "definition must be no more than 728 characters".into(),
                ));
            }
        }
        if let Some(description) = description {
            if description.len() > 498 {
                return Err(Error::InvalidArgument(
                    "description must be no more than 498 characters".into(),
                ));
            }
        }
        if let Some(greeting) = greeting {
            if greeting.len() > 2047 {
                return Err(Error::InvalidArgument(
                    "greeting must be no more than 2047 characters".into(),
                ));
            }
        }

        let old = self.fetch_persona(persona_id).await.map_err(|_| {
            Error::Edit("cannot edit persona; maybe it does not exist?".into())
        })?;
        let me = self.client.account().fetch_me().await?;

        let avatar = avatar_rel_path
            .or_else(|| old.get("avatar_file_name").and_then(Value::as_str))
            .unwrap_or("");
        let name = name.or_else(|| field(&old, "name")).unwrap_or("");

        let payload = json!({
            "avatar_file_name": avatar,
            "avatar_rel_path": avatar,
            "copyable": false,
            "default_voice_id": "",
            "definition": definition.or_else(|| field(&old, "definition")).unwrap_or(""),
            "description": description.or_else(|| field(&old, "description")).unwrap_or(""),
            "enabled": false,
            "external_id": persona_id,
            "greeting": greeting.or_else(|| field(&old, "greeting")).unwrap_or(""),
            "img_gen_enabled": false,
            "is_persona": true,
            "name": name,
            "participant__name": name,
            "participant__num_interactions": 0,
            "title": name,
            "user__id": me.get("id").cloned().unwrap_or(Value::Null),
            "user__username": field(&old, "author_username").unwrap_or(""),
            "visibility": "PRIVATE",
        });

        let response = self
            .client
            .post(&format!("{}/chat/persona/update/", self.client.plus_base()), &payload)
            .await?;
        if response.status_code == 200 {
            let body = response.json()?;
            if body.get("status").and_then(Value::as_str) == Some("OK") {
                if let Some(persona) = body.get("persona") {
                    if !persona.is_null() {
                        return Ok(persona.clone());
                    }
                }
            }
            return Err(Error::Edit(format!(
                "cannot edit persona: {}",
                body.get("error").and_then(Value::as_str).unwrap_or("")
            )));
        }
        Err(Error::Edit("cannot edit persona".into()))
    }

    /// Deletes (archives) a persona.
    pub async fn delete_persona(&self, persona_id: &str) -> Result<()> {
        let old = self.fetch_persona(persona_id).await.map_err(|_| {
            Error::Delete("cannot delete persona; maybe it does not exist?".into())
        })?;
        let me = self.client.account().fetch_me().await?;

        let avatar = old
            .get("avatar_file_name")
            .and_then(Value::as_str)
            .unwrap_or("");
        let name = field(&old, "name").unwrap_or("");

        let payload = json!({
            "archived": true,
            "avatar_file_name": avatar,
            "copyable": false,
            "default_voice_id": "",
            "definition": field(&old, "definition").unwrap_or(""),
            "description": "This is my persona.",
            "external_id": persona_id,
            "greeting": "Hello! This is my persona",
            "img_gen_enabled": false,
            "is_persona": true,
            "name": name,
            "participant__name": name,
            "participant__num_interactions": 0,
            "title": name,
            "user__id": me.get("id").cloned().unwrap_or(Value::Null),
            "user__username": field(&old, "author_username").unwrap_or(""),
            "visibility": "PRIVATE",
        });

        let response = self
            .client
            .post(&format!("{}/chat/persona/update/", self.client.plus_base()), &payload)
            .await?;
        if response.status_code == 200 {
            let body = response.json()?;
            if body.get("status").and_then(Value::as_str) == Some("OK")
                && body.get("persona").is_some_and(|p| !p.is_null())
            {
                return Ok(());
            }
            return Err(Error::Delete(format!(
                "cannot delete persona: {}",
                body.get("error").and_then(Value::as_str).unwrap_or("")
            )));
        }
        Err(Error::Delete("cannot delete persona".into()))
    }
}

fn field<'v>(value: &'v Value, name: &str) -> Option<&'v str> {
    value.get(name).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new("test-token").unwrap()
    }

    #[tokio::test]
    async fn create_persona_rejects_short_name() {
        let client = client();
        let err = client
            .personas()
            .create_persona("ab", "", "", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn create_persona_rejects_long_definition() {
        let client = client();
        let definition = "d".repeat(32001);
        let err = client
            .personas()
            .create_persona("name", "", "", "", &definition)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn edit_persona_rejects_long_greeting() {
        let client = client();
        let greeting = "g".repeat(2048);
        let err = client
            .personas()
            .edit_persona("pid", None, None, None, Some(&greeting), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
