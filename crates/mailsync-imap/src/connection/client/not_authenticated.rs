//! Implementation for the not-authenticated state.

use mailsync_auth::{AuthStep, Credential, sasl};
use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, NotAuthenticated};
use super::Client;
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::stream::ImapStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capabilities, Capability, ResponseCode, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a client from a connected stream.
    ///
    /// Reads the server greeting and any capabilities it carries.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let mut capabilities = Capabilities::default();
        match ResponseParser::parse(&greeting)? {
            Response::Untagged(
                UntaggedResponse::Ok { code, .. } | UntaggedResponse::PreAuth { code, .. },
            ) => {
                if let Some(ResponseCode::Capability(caps)) = code {
                    capabilities = Capabilities::new(caps);
                }
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                return Err(Error::Bye(text));
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        Ok(Self {
            stream: framed,
            tags: TagGenerator::default(),
            capabilities,
            pending: None,
            state: NotAuthenticated,
        })
    }

    /// Authenticates with `LOGIN`.
    pub async fn login(self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        let credential = mailsync_auth::PlainCredential::new(username, password);
        self.authenticate(&credential).await
    }

    /// Authenticates with whatever mechanism the credential speaks.
    ///
    /// Continuation challenges are answered by the credential until the
    /// server completes the command. Capabilities are refreshed afterwards,
    /// from the completion code when present, otherwise with CAPABILITY.
    pub async fn authenticate(
        mut self,
        credential: &dyn Credential,
    ) -> Result<Client<S, Authenticated>> {
        let mechanism = credential.mechanism();
        let step = credential.start(self.capabilities.has(&Capability::SaslIr))?;

        let command = match step {
            AuthStep::Login { username, password } => {
                if self.capabilities.has(&Capability::LoginDisabled) {
                    return Err(Error::Auth("LOGIN is disabled on this connection".to_string()));
                }
                Command::Login { username, password }
            }
            AuthStep::Sasl {
                mechanism,
                initial_response,
            } => {
                if !self.capabilities.is_empty() && !self.capabilities.has_auth(mechanism.as_str())
                {
                    tracing::debug!(%mechanism, "mechanism not advertised, trying anyway");
                }
                Command::Authenticate {
                    mechanism: mechanism.as_str().to_string(),
                    initial_response,
                }
            }
        };

        let tag = self.send(&command).await?;
        let mut refreshed = false;
        let mut failure = None;

        loop {
            let raw = self.stream.read_response().await?;
            match ResponseParser::parse(&raw)? {
                Response::Continuation { text } => {
                    let reply = sasl::decode_challenge(&text)
                        .and_then(|challenge| credential.respond(&challenge));
                    let line = match reply {
                        Ok(reply) => format!("{reply}\r\n"),
                        Err(error) => {
                            failure = Some(error);
                            "*\r\n".to_string()
                        }
                    };
                    self.stream.write_command(line.as_bytes()).await?;
                }
                Response::Untagged(UntaggedResponse::Capability(caps)) => {
                    self.capabilities = Capabilities::new(caps);
                    refreshed = true;
                }
                Response::Tagged {
                    tag: done,
                    status,
                    code,
                    text,
                } if done == tag => {
                    self.pending = None;
                    if let Some(error) = failure {
                        return Err(error.into());
                    }
                    match status {
                        Status::Ok => {
                            if let Some(ResponseCode::Capability(caps)) = code {
                                self.capabilities = Capabilities::new(caps);
                                refreshed = true;
                            }
                            break;
                        }
                        Status::No | Status::Bad => {
                            tracing::warn!(%mechanism, reason = %text, "authentication rejected");
                            return Err(Error::Auth(text));
                        }
                        Status::Bye => return Err(Error::Bye(text)),
                        Status::PreAuth => {
                            return Err(Error::Protocol("PREAUTH as a completion".to_string()));
                        }
                    }
                }
                Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                    return Err(Error::Bye(text));
                }
                _ => {}
            }
        }

        tracing::info!(%mechanism, "authenticated");
        let mut client = self.into_state(Authenticated);
        if !refreshed {
            client.capability().await?;
        }
        Ok(client)
    }
}

impl Client<ImapStream, NotAuthenticated> {
    /// Upgrades the connection with STARTTLS.
    ///
    /// Capabilities advertised before the upgrade are discarded and queried
    /// again over the encrypted channel.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        self.execute(&Command::StartTls).await?;

        // Anything the server sent after its OK arrived in plaintext and
        // could have been injected.
        if self.stream.has_buffered() {
            return Err(Error::Protocol(
                "unexpected data after STARTTLS completion".to_string(),
            ));
        }

        let stream = self.stream.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            stream: FramedStream::new(stream),
            tags: self.tags,
            capabilities: Capabilities::default(),
            pending: None,
            state: NotAuthenticated,
        };
        client.capability().await?;
        Ok(client)
    }
}
