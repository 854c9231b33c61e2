use secrecy::SecretString;

/// Account credentials supplied on the command line or through the environment.
#[derive(Clone)]
pub struct GlobalArgs {
    pub username: String,
    pub password: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(username: String) -> Self {
        Self {
            username,
            password: SecretString::default(),
        }
    }

    pub fn set_password(&mut self, password: SecretString) {
        self.password = password;
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
