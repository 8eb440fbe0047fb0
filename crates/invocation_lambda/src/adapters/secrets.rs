use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use invocation_core::{CollaboratorError, SecretPayload, SecretStore};

/// Secrets Manager backed [`SecretStore`].
#[derive(Debug, Clone)]
pub struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerStore {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn fetch_secret(&self, name: &str) -> Result<SecretPayload, CollaboratorError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|error| CollaboratorError::Secret {
                name: name.to_string(),
                message: DisplayErrorContext(&error).to_string(),
            })?;

        secret_payload(
            name,
            output.secret_string(),
            output.secret_binary().map(|blob| blob.as_ref()),
        )
    }
}

/// Binary material takes precedence over the string form when both are set.
pub fn secret_payload(
    name: &str,
    text: Option<&str>,
    binary: Option<&[u8]>,
) -> Result<SecretPayload, CollaboratorError> {
    match (binary, text) {
        (Some(bytes), _) => Ok(SecretPayload::Binary(bytes.to_vec())),
        (None, Some(text)) => Ok(SecretPayload::Text(text.to_string())),
        (None, None) => Err(CollaboratorError::EmptySecret(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_wins_over_text() {
        let payload = secret_payload("prod/key", Some("text"), Some(b"bytes"))
            .expect("payload should resolve");
        assert_eq!(payload, SecretPayload::Binary(b"bytes".to_vec()));
    }

    #[test]
    fn falls_back_to_text() {
        let payload =
            secret_payload("prod/key", Some("{\"a\":1}"), None).expect("payload should resolve");
        assert_eq!(payload, SecretPayload::Text("{\"a\":1}".to_string()));
    }

    #[test]
    fn missing_material_is_an_empty_secret() {
        let error = secret_payload("prod/key", None, None).expect_err("should fail");
        assert_eq!(error.to_string(), "secret `prod/key` has no value");
    }
}
