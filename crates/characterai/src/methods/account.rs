//! Account operations: profile, settings, followers, and owned content.

use serde_json::{json, Value};

use crate::client::Client;
use crate::error::{Error, Result};

pub struct AccountMethods<'a> {
    client: &'a Client,
}

impl<'a> AccountMethods<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Fetches the authenticated account.
    pub async fn fetch_me(&self) -> Result<Value> {
        let response = self.client.get(&format!("{}/chat/user/", self.client.plus_base())).await?;
        if response.status_code == 200 {
            if let Some(user) = response.json()?.pointer("/user/user") {
                return Ok(user.clone());
            }
        }
        Err(Error::Fetch("cannot fetch your account".into()))
    }

    /// Fetches the account settings object.
    pub async fn fetch_settings(&self) -> Result<Value> {
        let response = self
            .client
            .get(&format!("{}/chat/user/settings/", self.client.plus_base()))
            .await?;
        if response.status_code == 200 {
            return response.json();
        }
        Err(Error::Fetch("cannot fetch your settings".into()))
    }

    pub async fn fetch_followers(&self) -> Result<Vec<Value>> {
        self.fetch_list(&format!("{}/chat/user/followers/", self.client.plus_base()), "followers")
            .await
            .map_err(|_| Error::Fetch("cannot fetch your followers".into()))
    }

    pub async fn fetch_following(&self) -> Result<Vec<Value>> {
        self.fetch_list(&format!("{}/chat/user/following/", self.client.plus_base()), "following")
            .await
            .map_err(|_| Error::Fetch("cannot fetch your following".into()))
    }

    /// Fetches the characters owned by the account.
    pub async fn fetch_characters(&self) -> Result<Vec<Value>> {
        self.fetch_list(
            &format!("{}/chat/characters/?scope=user", self.client.plus_base()),
            "characters",
        )
        .await
        .map_err(|_| Error::Fetch("cannot fetch your characters".into()))
    }

    pub async fn fetch_upvoted_characters(&self) -> Result<Vec<Value>> {
        self.fetch_list(
            &format!("{}/chat/user/characters/upvoted/", self.client.plus_base()),
            "characters",
        )
        .await
        .map_err(|_| Error::Fetch("cannot fetch your upvoted characters".into()))
    }

    /// Updates the public profile.
    ///
    /// Username must be 2–20 characters, name 2–50, bio at most 500.
    pub async fn edit_account(
        &self,
        name: &str,
        username: &str,
        bio: &str,
        avatar_rel_path: Option<&str>,
    ) -> Result<()> {
        if username.len() < 2 || username.len() > 20 {
            return Err(Error::InvalidArgument(
                "username must be at least 2 characters and no more than 20".into(),
            ));
        }
        if name.len() < 2 || name.len() > 50 {
            return Err(Error::InvalidArgument(
                "name must be at least 2 characters and no more than 50".into(),
            ));
        }
        if bio.len() > 500 {
            return Err(Error::InvalidArgument(
                "bio must be no more than 500 characters".into(),
            ));
        }

        let mut body = json!({
            "avatar_type": if avatar_rel_path.is_some() { "UPLOADED" } else { "DEFAULT" },
            "bio": bio,
            "name": name,
            "username": username,
        });
        if let Some(path) = avatar_rel_path {
            body["avatar_rel_path"] = json!(path);
        }

        let response = self
            .client
            .post(&format!("{}/chat/user/update/", self.client.plus_base()), &body)
            .await?;
        if response.status_code == 200 {
            let payload = response.json()?;
            if payload.get("status").and_then(Value::as_str) == Some("OK") {
                return Ok(());
            }
            return Err(Error::Edit(format!(
                "cannot edit account info: {}",
                payload.get("status").and_then(Value::as_str).unwrap_or("")
            )));
        }
        Err(Error::Edit("cannot edit account info".into()))
    }

    /// Sets (or clears, with `None`) the default persona applied to new
    /// chats.
    pub async fn set_default_persona(&self, persona_id: Option<&str>) -> Result<()> {
        self.update_settings(Some(persona_id.unwrap_or("")), None)
            .await
            .map(|_| ())
            .map_err(|_| Error::Set("cannot set default persona".into()))
    }

    pub async fn unset_default_persona(&self) -> Result<()> {
        self.set_default_persona(None).await
    }

    /// Overrides the persona used with one character.
    pub async fn set_persona_override(&self, character_id: &str, persona_id: &str) -> Result<()> {
        self.update_settings(None, Some((character_id, persona_id)))
            .await
            .map(|_| ())
            .map_err(|_| Error::Set("cannot set persona override".into()))
    }

    /// Clears the persona override for one character; the service treats an
    /// empty override as none.
    pub async fn unset_persona_override(&self, character_id: &str) -> Result<()> {
        self.set_persona_override(character_id, "").await
    }

    /// Read-modify-write of the settings object; the service only accepts
    /// full settings payloads.
    async fn update_settings(
        &self,
        default_persona_id: Option<&str>,
        persona_override: Option<(&str, &str)>,
    ) -> Result<Value> {
        if default_persona_id.is_none() && persona_override.is_none() {
            return Err(Error::Update("cannot update account settings".into()));
        }

        let mut settings = self.fetch_settings().await?;
        if !settings.is_object() {
            return Err(Error::Update("cannot update account settings".into()));
        }

        if let Some(persona_id) = default_persona_id {
            settings["default_persona_id"] = json!(persona_id);
        }
        if let Some((character_id, persona_id)) = persona_override {
            settings["personaOverrides"][character_id] = json!(persona_id);
        }

        let response = self
            .client
            .post(&format!("{}/chat/user/update_settings/", self.client.plus_base()), &settings)
            .await?;
        if response.status_code == 200 {
            let payload = response.json()?;
            if payload.get("success").and_then(Value::as_bool) == Some(true) {
                return Ok(payload.get("settings").cloned().unwrap_or(Value::Null));
            }
        }
        Err(Error::Update("cannot update account settings".into()))
    }

    async fn fetch_list(&self, url: &str, field: &str) -> Result<Vec<Value>> {
        let response = self.client.get(url).await?;
        if response.status_code == 200 {
            let items = response
                .json()?
                .get(field)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return Ok(items);
        }
        Err(Error::Fetch(format!("cannot fetch {field}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new("test-token").unwrap()
    }

    #[tokio::test]
    async fn edit_account_rejects_short_username() {
        let client = client();
        let err = client
            .account()
            .edit_account("A valid name", "x", "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn edit_account_rejects_long_name() {
        let client = client();
        let name = "n".repeat(51);
        let err = client
            .account()
            .edit_account(&name, "username", "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn edit_account_rejects_long_bio() {
        let client = client();
        let bio = "b".repeat(501);
        let err = client
            .account()
            .edit_account("A valid name", "username", &bio, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
