use cartlink_core::models::profile::{ProfileUpdate, Session};
use clap::{Args, Parser, Subcommand};

/// Cartlink operator CLI.
#[derive(Parser, Debug)]
#[command(name = "cartlink", version, about = "Commerce identity linking and token lifecycle")]
pub struct Cli {
    /// PostgreSQL connection URL.
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/cartlink"
    )]
    pub database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, global = true, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Passphrase for encrypting stored refresh tokens.
    #[arg(long, global = true, env = "TOKEN_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Apply pending database migrations and exit.
    Migrate,

    /// Print a valid commerce access token for a user.
    Token(UserArgs),

    /// Create the user's profile if needed, then print a token.
    SignIn(UserArgs),

    /// Save profile settings for a user.
    Profile {
        #[command(flatten)]
        user: UserArgs,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// Show the stored commerce link for a user. The refresh token is never printed.
    Link {
        #[arg(long)]
        user_id: String,
    },

    /// Read commands line by line from stdin against one token cache.
    ///
    /// Commands: `token <user> <email>`, `sign-in <user> <email>`,
    /// `sign-out <user>`, `quit`.
    Session,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct UserArgs {
    /// Identity-provider user id.
    #[arg(long)]
    pub user_id: String,

    #[arg(long)]
    pub email: String,
}

impl UserArgs {
    pub fn session(&self) -> Session {
        Session {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }
}

pub fn profile_update(
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
) -> ProfileUpdate {
    ProfileUpdate {
        first_name,
        last_name,
        phone,
    }
}
