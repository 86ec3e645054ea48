//! Voice operations: fetches against the multimodal API, per-character
//! voice overrides against the main chat API.

use serde_json::{json, Value};

use crate::client::Client;
use crate::error::{Error, Result};

pub struct VoiceMethods<'a> {
    client: &'a Client,
}

impl<'a> VoiceMethods<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Fetches the voices owned by the account.
    pub async fn fetch_my_voices(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&format!("{}/multimodal/api/v1/voices/user", self.client.neo_base()))
            .await?;
        if response.status_code == 200 {
            let voices = response
                .json()?
                .get("voices")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            return Ok(voices);
        }
        Err(Error::Fetch("cannot fetch your voices".into()))
    }

    /// Fetches one voice by id.
    pub async fn fetch_voice(&self, voice_id: &str) -> Result<Value> {
        let response = self
            .client
            .get(&format!("{}/multimodal/api/v1/voices/{voice_id}", self.client.neo_base()))
            .await?;
        if response.status_code == 200 {
            if let Some(voice) = response.json()?.get("voice") {
                if !voice.is_null() {
                    return Ok(voice.clone());
                }
            }
        }
        Err(Error::Fetch(
            "cannot fetch voice; maybe it does not exist?".into(),
        ))
    }

    /// Overrides the voice used with one character.
    pub async fn set_voice(&self, character_id: &str, voice_id: &str) -> Result<()> {
        self.voice_override(character_id, Some(voice_id)).await
    }

    /// Clears the voice override for one character.
    pub async fn unset_voice(&self, character_id: &str) -> Result<()> {
        self.voice_override(character_id, None).await
    }

    /// Setting goes through the `update` endpoint with a body; clearing
    /// through the bodyless `delete` endpoint.
    async fn voice_override(&self, character_id: &str, voice_id: Option<&str>) -> Result<()> {
        let action = if voice_id.is_some() { "update" } else { "delete" };
        let url = format!(
            "{}/chat/character/{character_id}/voice_override/{action}/",
            self.client.plus_base()
        );
        let response = match voice_id {
            Some(voice_id) => self.client.post(&url, &json!({"voice_id": voice_id})).await?,
            None => self.client.post_empty(&url).await?,
        };
        if response.status_code == 200
            && response.json()?.get("success").and_then(Value::as_bool) == Some(true)
        {
            return Ok(());
        }
        Err(Error::Set("cannot set voice override".into()))
    }
}
