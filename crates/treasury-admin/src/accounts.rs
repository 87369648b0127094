use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use email_address::EmailAddress;
use itertools::Itertools;
use rand::Rng;
use std::time::Duration;
use treasury_db::{
    models::{Role, Token, TokenCreate, TokenType, User, UserCreate},
    KnownErrorKind, Store, UserWhereUnique,
};

const TOKEN_BYTES: usize = 32;

/// Lifetimes of newly issued tokens, per token type.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub reset_password_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub verify_email_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(30 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            reset_password_ttl: Duration::from_secs(10 * 60),
            verify_email_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
            TokenType::ResetPassword => self.reset_password_ttl,
            TokenType::VerifyEmail => self.verify_email_ttl,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("User database error: {0}")]
    UserDb(#[from] treasury_db::Error),
    #[error("email address {email:?} is invalid: {reason}")]
    InvalidEmail { email: String, reason: String },
    #[error("an account for {0} already exists")]
    EmailTaken(String),
    #[error("pass phrase rejected: {}", .0.join("; "))]
    WeakPassPhrase(Vec<&'static str>),
    #[error("Stored pass phrase could not be parsed: {0}")]
    StoredPassPhraseUnableToParse(argon2::password_hash::Error),
    #[error("Pass phrase could not be verified: {0}")]
    PassPhraseUnableToVerify(argon2::password_hash::Error),
    #[error("Pass phrase hash failed: {0}")]
    PassPhraseHash(argon2::password_hash::Error),
    #[error("token lifetime {} is out of range: {source}", humantime::format_duration(*.ttl))]
    TtlOutOfRange { ttl: Duration, source: jiff::Error },
}

pub fn validate_email(email: &str) -> Result<(), Error> {
    email
        .parse::<EmailAddress>()
        .map(|_| ())
        .map_err(|err| Error::InvalidEmail {
            email: email.to_owned(),
            reason: err.to_string(),
        })
}

/// Checks the pass phrase rules and returns the phrase with its whitespace
/// removed, which is the form that gets hashed.
pub fn validate_pass_phrase(pass_phrase: &str) -> Result<String, Error> {
    let mut problems = Vec::new();
    let stripped_pass_phrase = strip(pass_phrase);
    if stripped_pass_phrase.chars().count() < 24 {
        problems.push("pass phrase must be at least 24 characters in length excluding spaces");
    }
    if stripped_pass_phrase.chars().count() > 512 {
        problems.push("pass phrase must be at most 512 characters in length excluding spaces");
    }
    if pass_phrase.split_whitespace().count() < 5 {
        problems.push("pass phrase must have at least 5 words separated by space");
    }
    if stripped_pass_phrase.chars().unique().count() < 8 {
        problems.push("pass phrase must have at least 8 unique non-space characters");
    }
    if pass_phrase.split_whitespace().unique().count() < 4 {
        problems.push("pass phrase must have at least 4 unique, non-repeated words");
    }
    if problems.is_empty() {
        Ok(stripped_pass_phrase)
    } else {
        Err(Error::WeakPassPhrase(problems))
    }
}

fn strip(pass_phrase: &str) -> String {
    pass_phrase.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn hash_pass_phrase(pass_phrase: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pass_phrase.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(Error::PassPhraseHash)
}

pub fn pass_phrase_matches(stored: &str, candidate: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(stored).map_err(Error::StoredPassPhraseUnableToParse)?;
    match Argon2::default().verify_password(strip(candidate).as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(Error::PassPhraseUnableToVerify(err)),
    }
}

/// A fresh opaque token value: 32 random bytes, base64url without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn expiry(now: jiff::Timestamp, ttl: Duration) -> Result<jiff::Timestamp, Error> {
    now.checked_add(ttl)
        .map_err(|source| Error::TtlOutOfRange { ttl, source })
}

pub struct Accounts {
    store: Store,
    config: Config,
}

impl Accounts {
    pub fn new(store: Store, config: Config) -> Self {
        Self { store, config }
    }

    #[tracing::instrument(skip(self, pass_phrase))]
    pub async fn register(
        &self,
        email: &str,
        pass_phrase: &str,
        name: Option<String>,
        role: Role,
    ) -> Result<User, Error> {
        let email = email.trim();
        validate_email(email)?;
        let pass_phrase = validate_pass_phrase(pass_phrase)?;
        let password = hash_pass_phrase(&pass_phrase)?;
        let created = self
            .store
            .user()
            .create(UserCreate {
                email: email.to_owned(),
                name,
                password,
                role: Some(role),
                ..Default::default()
            })
            .await;
        match created {
            Ok(user) => Ok(user),
            Err(err) if err.kind() == Some(KnownErrorKind::UniqueConstraint) => {
                Err(Error::EmailTaken(email.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The user owning `email` when `pass_phrase` matches the stored hash.
    #[tracing::instrument(skip(self, pass_phrase))]
    pub async fn verify(&self, email: &str, pass_phrase: &str) -> Result<Option<User>, Error> {
        let Some(user) = self
            .store
            .user()
            .find_unique(UserWhereUnique::Email(email.trim().to_owned()))
            .await?
        else {
            return Ok(None);
        };
        Ok(pass_phrase_matches(&user.password, pass_phrase)?.then_some(user))
    }

    #[tracing::instrument(skip(self))]
    pub async fn issue_token(
        &self,
        user_id: i32,
        token_type: TokenType,
        ttl: Option<Duration>,
    ) -> Result<Token, Error> {
        let user = self
            .store
            .user()
            .find_unique_or_throw(UserWhereUnique::Id(user_id))
            .await?;
        let expires = expiry(jiff::Timestamp::now(), ttl.unwrap_or(self.config.ttl(token_type)))?;
        let token = self
            .store
            .token()
            .create(TokenCreate {
                token: generate_token(),
                token_type,
                expires,
                blacklisted: None,
                created_at: None,
                user_id: user.id,
            })
            .await?;
        Ok(token)
    }

    #[tracing::instrument(skip(self))]
    pub async fn revoke_tokens(&self, user_id: i32, token_type: Option<TokenType>) -> Result<usize, Error> {
        Ok(self.store.token().blacklist_for_user(user_id, token_type).await?)
    }
}
