mod api;
mod case;
mod config;
mod feed;
mod pipe;
mod state;
mod store;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use api::models::{LikeableType, LoginRequest, SignupRequest, UpdateUserRequest, User};
use api::{ApiClient, ApiError, ImageUpload, ReqwestTransport};
use config::ClientConfig;
use feed::{FeedKind, FeedLoader, LoadOutcome, EXPLORE_PREFETCH_PAGES, PREFETCH_PAUSE};
use pipe::stdio::Direction;

#[derive(Parser)]
#[command(name = "isntgram", about = "Command-line client for the Isntgram API")]
struct Cli {
    /// Base URL of the API server
    #[arg(long, global = true, env = "ISNTGRAM_API_URL")]
    api_url: Option<String>,

    /// Posts per feed page
    #[arg(long, global = true, env = "ISNTGRAM_PAGE_SIZE")]
    page_size: Option<usize>,

    /// Token database (defaults to ~/.isntgram/isntgram.db)
    #[arg(long, global = true, env = "ISNTGRAM_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and keep the access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ISNTGRAM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, env = "ISNTGRAM_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        bio: Option<String>,
    },

    /// Log out and forget the stored token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Show a user's profile with posts and follows
    Profile { username: String },

    /// Look a user up by username
    Lookup { username: String },

    /// Change fields of the signed-in user's profile
    UpdateProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },

    /// Restore the default avatar
    ResetAvatar,

    /// Home feed: posts from the people you follow
    Feed {
        /// Pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Explore grid
    Explore {
        #[arg(long, default_value_t = EXPLORE_PREFETCH_PAGES)]
        pages: usize,
    },

    /// Show, create, edit or delete a post
    Post {
        #[command(subcommand)]
        action: PostAction,
    },

    /// Upload an image as a new post
    Upload {
        file: PathBuf,
        #[arg(long)]
        caption: Option<String>,
    },

    /// Upload a new avatar
    Avatar { file: PathBuf },

    /// Comment on a post
    Comment { post_id: i64, content: String },

    /// Like a post or comment
    Like {
        id: i64,
        #[arg(long, value_enum, default_value_t = Target::Post)]
        kind: Target,
    },

    /// Take back a like
    Unlike {
        id: i64,
        #[arg(long, value_enum, default_value_t = Target::Post)]
        kind: Target,
    },

    /// List likes on a post or comment, or everything a user liked
    Likes {
        #[arg(required_unless_present = "user")]
        id: Option<i64>,
        #[arg(long, value_enum, default_value_t = Target::Post)]
        kind: Target,
        /// List this user's likes instead
        #[arg(long, conflicts_with = "id")]
        user: Option<String>,
    },

    /// Follow a user
    Follow { username: String },

    /// Stop following a user
    Unfollow { username: String },

    /// Who follows a user (yourself by default)
    Followers { username: Option<String> },

    /// Who a user follows (yourself by default)
    Following { username: Option<String> },

    /// Search users by name
    Search { query: String },

    /// Rewrite JSON keys read line by line from stdin
    Convert {
        #[arg(long, value_enum)]
        to: Direction,
    },
}

#[derive(Subcommand)]
enum PostAction {
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        image_url: String,
        #[arg(long)]
        caption: Option<String>,
    },
    Edit {
        id: i64,
        #[arg(long)]
        caption: String,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    Post,
    Comment,
}

impl From<Target> for LikeableType {
    fn from(target: Target) -> Self {
        match target {
            Target::Post => LikeableType::Post,
            Target::Comment => LikeableType::Comment,
        }
    }
}

type Client = ApiClient<ReqwestTransport>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ApiError>() {
            Some(api) => match api.status() {
                Some(status) => eprintln!("Error ({status}): {}", api.user_message()),
                None => eprintln!("Error: {}", api.user_message()),
            },
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // No server or token needed
    if let Commands::Convert { to } = cli.command {
        return pipe::stdio::run(to).await;
    }

    let config = ClientConfig::resolve(cli.api_url, cli.page_size, cli.db)?;
    tracing::debug!("Using API at {}, tokens in {}", config.base_url, config.db_path.display());

    let tokens = store::TokenStore::open(&config.db_path)?;
    let client = ApiClient::new(ReqwestTransport::new()?, &config.base_url, Box::new(tokens));

    match cli.command {
        Commands::Convert { .. } => {}

        Commands::Login { email, password } => {
            let user = client.login(&LoginRequest { email, password }).await?;
            eprintln!("Logged in as {}", user.username);
        }

        Commands::Signup {
            username,
            email,
            full_name,
            password,
            bio,
        } => {
            let request = SignupRequest {
                username,
                email,
                full_name,
                confirm_password: password.clone(),
                password,
                bio,
            };
            let user = client.signup(&request).await?;
            eprintln!("Welcome, {}", user.username);
        }

        Commands::Logout => {
            client.logout().await?;
            eprintln!("Logged out");
        }

        Commands::Whoami => {
            let me = client.authenticate().await?;
            print_json(&me)?;
        }

        Commands::Profile { username } => {
            print_json(&client.get_profile(&username).await?)?;
        }

        Commands::Lookup { username } => {
            print_json(&client.lookup_user(&username).await?)?;
        }

        Commands::UpdateProfile {
            username,
            email,
            full_name,
            bio,
        } => {
            let me = client.authenticate().await?;
            let request = UpdateUserRequest {
                id: me.id,
                username: username.unwrap_or(me.username),
                email: email.or(me.email).unwrap_or_default(),
                full_name: full_name.or(me.full_name).unwrap_or_default(),
                bio: bio.or(me.bio),
            };
            print_json(&client.update_user(&request).await?)?;
        }

        Commands::ResetAvatar => {
            let me = client.authenticate().await?;
            print_json(&client.reset_user_image(me.id).await?)?;
        }

        Commands::Feed { pages } => {
            let me = client.authenticate().await?;
            client.following(me.id).await?;
            let loader = FeedLoader::new(&client, FeedKind::Home { user_id: me.id }, config.page_size);
            show_feed(&client, &loader, pages).await?;
        }

        Commands::Explore { pages } => {
            client.authenticate().await?;
            let loader = FeedLoader::new(&client, FeedKind::Explore, config.page_size);
            show_feed(&client, &loader, pages).await?;
        }

        Commands::Post { action } => match action {
            PostAction::Show { id } => print_json(&client.get_post(id).await?)?,
            PostAction::Create { image_url, caption } => {
                client.authenticate().await?;
                print_json(&client.create_post(&image_url, caption.as_deref()).await?)?;
            }
            PostAction::Edit { id, caption } => {
                print_json(&client.update_post(id, &caption).await?)?;
            }
            PostAction::Delete { id } => {
                client.delete_post(id).await?;
                eprintln!("Deleted post {id}");
            }
        },

        Commands::Upload { file, caption } => {
            client.authenticate().await?;
            let image = ImageUpload::from_path(&file)?;
            print_json(&client.upload_post(caption.as_deref(), image).await?)?;
        }

        Commands::Avatar { file } => {
            let me = client.authenticate().await?;
            let image = ImageUpload::from_path(&file)?;
            let url = client.upload_profile_image(me.id, image).await?;
            eprintln!("Avatar updated: {url}");
        }

        Commands::Comment { post_id, content } => {
            client.authenticate().await?;
            print_json(&client.create_comment(post_id, &content).await?)?;
        }

        Commands::Like { id, kind } => {
            client.authenticate().await?;
            print_json(&client.like(kind.into(), id).await?)?;
        }

        Commands::Unlike { id, kind } => {
            client.authenticate().await?;
            let kind = LikeableType::from(kind);
            client.likes_for(kind, id).await?;
            let Some(like_id) = client.session().read(|s| s.like_id(kind, id)) else {
                bail!("You have not liked {kind} {id}");
            };
            client.unlike(like_id).await?;
            eprintln!("Unliked {kind} {id}");
        }

        Commands::Likes { id, kind, user } => {
            let likes = match (user, id) {
                (Some(name), _) => {
                    let user = client.lookup_user(&name).await?;
                    client.user_likes(user.id).await?
                }
                (None, Some(id)) => client.likes_for(kind.into(), id).await?,
                (None, None) => bail!("Give a post or comment id, or --user"),
            };
            print_json(&likes)?;
        }

        Commands::Follow { username } => {
            let me = client.authenticate().await?;
            client.following(me.id).await?;
            let target = client.lookup_user(&username).await?;
            if client.session().read(|s| s.is_following(target.id)) {
                eprintln!("Already following {}", target.username);
                return Ok(());
            }
            client.follow(target.id).await?;
            eprintln!("Now following {}", target.username);
        }

        Commands::Unfollow { username } => {
            client.authenticate().await?;
            let target = client.lookup_user(&username).await?;
            client.unfollow(target.id).await?;
            eprintln!("No longer following {}", target.username);
        }

        Commands::Followers { username } => {
            let user = user_or_me(&client, username).await?;
            print_json(&client.followers(user.id).await?)?;
        }

        Commands::Following { username } => {
            let user = user_or_me(&client, username).await?;
            print_json(&client.following(user.id).await?)?;
        }

        Commands::Search { query } => {
            let results = client.search(&query).await?;
            if results.is_empty() {
                eprintln!("No users match '{query}'");
            } else {
                print_json(&results)?;
            }
        }
    }

    Ok(())
}

async fn user_or_me(client: &Client, username: Option<String>) -> Result<User> {
    Ok(match username {
        Some(name) => client.lookup_user(&name).await?,
        None => client.authenticate().await?,
    })
}

async fn show_feed(client: &Client, loader: &FeedLoader<'_, Client>, pages: usize) -> Result<()> {
    let state = client.session().snapshot();
    match loader.load_initial(&state).await? {
        LoadOutcome::NotReady => match loader.kind() {
            FeedKind::Home { .. } => bail!("Follow someone to fill your home feed"),
            FeedKind::Explore => bail!("Not authenticated"),
        },
        outcome => tracing::debug!("First page: {:?}", outcome),
    }

    if pages > 1 && loader.has_more() {
        if let Err(e) = loader.prefetch(pages - 1, PREFETCH_PAUSE).await {
            let reason = loader.last_error().unwrap_or_else(|| e.user_message());
            eprintln!("Stopped at offset {}: {reason}", loader.offset());
        }
    }

    if loader.is_empty() {
        eprintln!("No posts yet");
        return Ok(());
    }

    print_json(&loader.posts())?;
    eprintln!(
        "{} post(s), offset {}{}",
        loader.len(),
        loader.offset(),
        if loader.has_more() { ", more available" } else { "" }
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
