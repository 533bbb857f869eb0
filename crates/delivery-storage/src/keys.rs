//! Storage key constants.

/// Fixed secure-store keys for the credential session.
pub struct StorageKeys;

impl StorageKeys {
    /// Auth token issued by the collection endpoint
    pub const AUTHENTICATION_TOKEN: &'static str = "AuthenticationToken";

    /// Participant username
    pub const USERNAME: &'static str = "Username";

    /// Participant password
    pub const PASSWORD: &'static str = "Password";

    /// Every key owned by the session, in removal order.
    pub const ALL: [&'static str; 3] = [Self::AUTHENTICATION_TOKEN, Self::USERNAME, Self::PASSWORD];
}
