use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use redactive_core::auth::{AuthClient, AuthProvider, BeginConnectionParams, TokenExchange};
use redactive_core::config::{ClientConfig, ConfigLocator};
use redactive_core::search::{
    DocumentRef, Filters, Query, RelevantChunk, SearchClient, SearchProvider, DEFAULT_SEARCH_COUNT,
};
use redactive_core::session::{
    token_expiry, ConnectionOptions, FileCredentialStore, SessionManager,
};
use textwrap::wrap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_CALLBACK_URI: &str = "http://localhost:8000/callback";
const WRAP_WIDTH: usize = 100;

#[derive(Parser, Debug)]
#[command(author, version, about = "Redactive search and session CLI")]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect a data source and print the resulting tokens
    SetupDatasource(SetupArgs),
    /// Exchange a refresh token for new tokens
    RefreshToken(RefreshArgs),
    /// Interactive semantic search with an id token
    Query(QueryArgs),
    /// Per-user session operations backed by the local credential store
    User(UserArgs),
}

#[derive(Args, Debug)]
struct AppKeyArgs {
    /// Redactive application key
    #[arg(long = "app-key", env = "REDACTIVE_API_KEY", hide_env_values = true)]
    app_key: String,
}

#[derive(Args, Debug)]
struct SetupArgs {
    #[command(flatten)]
    key: AppKeyArgs,
    /// Data source provider (e.g. confluence, google-drive)
    provider: String,
    /// Redirect URI registered for the application
    #[arg(long = "redirect-uri", default_value = DEFAULT_CALLBACK_URI)]
    redirect_uri: Url,
    /// Provider-specific endpoint, e.g. a self-hosted instance
    #[arg(long)]
    endpoint: Option<String>,
    /// Open the authorization URL in the default browser
    #[arg(long)]
    open: bool,
}

#[derive(Args, Debug)]
struct RefreshArgs {
    #[command(flatten)]
    key: AppKeyArgs,
    refresh_token: String,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Id token used to authorize search calls
    #[arg(long = "id-token", env = "REDACTIVE_ID_TOKEN", hide_env_values = true)]
    id_token: String,
    /// Maximum number of chunks per query
    #[arg(long, default_value_t = DEFAULT_SEARCH_COUNT)]
    count: u32,
    /// Restrict results to these data sources (repeatable)
    #[arg(long = "datasource")]
    datasources: Vec<String>,
}

#[derive(Args, Debug)]
struct UserArgs {
    #[command(flatten)]
    key: AppKeyArgs,
    /// Application user the session belongs to
    #[arg(long, short = 'u')]
    user: String,
    /// Callback URI the auth service redirects users back to
    #[arg(long = "callback-uri", env = "REDACTIVE_CALLBACK_URI", default_value = DEFAULT_CALLBACK_URI)]
    callback_uri: Url,
    /// Directory for stored credentials (defaults to the platform config dir)
    #[arg(long = "store-dir")]
    store_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Start a connection flow and print the authorization URL
    Connect {
        provider: String,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long = "code-param-alias")]
        code_param_alias: Option<String>,
        #[arg(long)]
        open: bool,
    },
    /// Complete a connection flow with the callback's code and state
    Callback {
        code: String,
        #[arg(long)]
        state: Option<String>,
    },
    /// List connected providers
    Connections,
    /// Show the email claim of the stored id token
    Email,
    /// Search on behalf of the user
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_COUNT)]
        count: u32,
        /// Treat the query as keywords instead of a semantic query
        #[arg(long)]
        keyword: bool,
        #[arg(long = "datasource")]
        datasources: Vec<String>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch all chunks of a document by name or URL
    Document {
        reference: String,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the stored session
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::SetupDatasource(args) => setup_datasource(args).await?,
        Commands::RefreshToken(args) => refresh_token(args).await?,
        Commands::Query(args) => query_loop(args).await?,
        Commands::User(args) => user_command(args).await?,
    }
    Ok(())
}

// `RUST_LOG` wins when set; otherwise `-v` selects debug output.
fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }))
}

fn client_config() -> Result<ClientConfig> {
    ClientConfig::from_env().context("invalid Redactive connection settings")
}

fn auth_client(key: AppKeyArgs) -> Result<AuthClient> {
    let config = client_config()?;
    AuthClient::with_base_url(key.app_key, config.auth_base_url)
        .context("failed to build auth client")
}

async fn setup_datasource(args: SetupArgs) -> Result<()> {
    let auth = auth_client(args.key)?;
    let mut params = BeginConnectionParams::new(&args.provider, args.redirect_uri);
    params.endpoint = args.endpoint;

    let url = auth
        .begin_connection(&params)
        .await
        .context("failed to begin connection")?;
    print_authorization_url(&url);
    if args.open {
        open_browser(&url);
    }

    let code = prompt("Paste the authorization code: ").await?;
    if code.is_empty() {
        bail!("no authorization code provided");
    }
    let tokens = auth
        .exchange_tokens(Some(&code), None)
        .await
        .context("token exchange failed")?;
    render_tokens(&tokens)
}

async fn refresh_token(args: RefreshArgs) -> Result<()> {
    let auth = auth_client(args.key)?;
    let tokens = auth
        .exchange_tokens(None, Some(&args.refresh_token))
        .await
        .context("token refresh failed")?;
    render_tokens(&tokens)
}

async fn query_loop(args: QueryArgs) -> Result<()> {
    let config = client_config()?;
    let search =
        SearchClient::with_base_url(config.search_base_url).context("failed to build search client")?;
    let filters = scope_filter(args.datasources);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"query> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match search
            .search_chunks(&args.id_token, &Query::semantic(text), args.count, filters.as_ref())
            .await
        {
            Ok(chunks) => render_chunks(&chunks),
            Err(err) => eprintln!("Search failed: {err}"),
        }
    }
    Ok(())
}

async fn user_command(args: UserArgs) -> Result<()> {
    let locator = match &args.store_dir {
        Some(dir) => ConfigLocator::with_root(dir),
        None => ConfigLocator::new(),
    }
    .context("unable to initialise credential store")?;
    let store = FileCredentialStore::new(&locator);
    debug!(dir = %store.dir().display(), "using credential store");

    let manager =
        SessionManager::with_clients(args.key.app_key, args.callback_uri, store, &client_config()?)
            .context("failed to build session manager")?;
    let user = args.user.as_str();

    match args.command {
        UserCommand::Connect {
            provider,
            endpoint,
            code_param_alias,
            open,
        } => {
            let url = manager
                .begin_connection_flow_with(
                    user,
                    &provider,
                    ConnectionOptions {
                        endpoint,
                        code_param_alias,
                    },
                )
                .await
                .context("failed to begin connection")?;
            print_authorization_url(&url);
            if open {
                open_browser(&url);
            }
        }
        UserCommand::Callback { code, state } => {
            let completed = manager
                .complete_connection_flow(user, &code, state.as_deref())
                .await
                .context("failed to complete connection")?;
            if !completed {
                bail!("callback rejected: no pending connection for '{user}' with that state");
            }
            println!("Connection completed for '{user}'.");
        }
        UserCommand::Connections => {
            let connections = manager
                .connections_for_user(user)
                .await
                .context("failed to list connections")?;
            if connections.is_empty() {
                println!("No connected data sources.");
            }
            for connection in connections {
                println!("{connection}");
            }
        }
        UserCommand::Email => match manager.email_for_user(user).await? {
            Some(email) => println!("{email}"),
            None => println!("No email on record for '{user}'."),
        },
        UserCommand::Search {
            query,
            count,
            keyword,
            datasources,
            json,
        } => {
            let query = if keyword {
                Query::keyword(query)
            } else {
                Query::semantic(query)
            };
            let filters = scope_filter(datasources);
            let chunks = manager
                .search_chunks(user, &query, count, filters.as_ref())
                .await
                .context("search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                render_chunks(&chunks);
            }
        }
        UserCommand::Document { reference, json } => {
            let chunks = manager
                .get_document(user, &document_ref(reference), None)
                .await
                .context("document lookup failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                for chunk in &chunks {
                    print_body(&chunk.chunk_body);
                }
            }
        }
        UserCommand::Logout => {
            manager
                .clear_session(user)
                .await
                .context("failed to clear session")?;
            println!("Deleted stored session for '{user}'.");
        }
    }
    Ok(())
}

fn scope_filter(datasources: Vec<String>) -> Option<Filters> {
    if datasources.is_empty() {
        None
    } else {
        Some(Filters::default().with_scope(datasources))
    }
}

fn document_ref(reference: String) -> DocumentRef {
    match Url::parse(&reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => DocumentRef::Url(reference),
        _ => DocumentRef::Name(reference),
    }
}

async fn prompt(message: &'static str) -> Result<String> {
    task::spawn_blocking(move || -> Result<String> {
        use std::io::{self, Write};
        print!("{message}");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_owned())
    })
    .await
    .context("prompt task failed")?
}

fn print_authorization_url(url: &str) {
    println!("\nAuthorize the data source by visiting:\n  {url}\n");
}

fn open_browser(url: &str) {
    if let Err(err) = open::that(url) {
        eprintln!("Failed to launch browser ({err}); open the URL manually.");
    }
}

fn token_expiry_at(tokens: &TokenExchange, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    token_expiry(tokens.expires_in, now).context("auth service returned an unusable token lifetime")
}

fn render_tokens(tokens: &TokenExchange) -> Result<()> {
    let expiry = token_expiry_at(tokens, Utc::now())?;
    println!("ID token     : {}", tokens.id_token);
    println!("Refresh token: {}", tokens.refresh_token);
    println!("Expires at   : {} (UTC)", expiry.to_rfc3339());
    Ok(())
}

fn render_chunks(chunks: &[RelevantChunk]) {
    if chunks.is_empty() {
        println!("No results.");
        return;
    }
    for chunk in chunks {
        let title = chunk
            .source
            .document_name
            .as_deref()
            .unwrap_or(chunk.source.document_id.as_str());
        println!(
            "[{}] {} (score {:.3})",
            chunk.source.system, title, chunk.relevance.similarity_score
        );
        if let Some(link) = &chunk.document_metadata.link {
            println!("  {link}");
        }
        print_body(&chunk.chunk_body);
    }
}

fn print_body(body: &str) {
    for line in wrap(body, WRAP_WIDTH) {
        println!("    {line}");
    }
    println!();
}
