use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const DEFAULT_URL: &str = "http://localhost:5000";
const TOKEN_FILE: &str = ".files_manager_token";

#[derive(Parser)]
#[command(name = "files")]
#[command(about = "A CLI client for the files manager", long_about = None)]
struct Cli {
    #[arg(long, default_value = DEFAULT_URL, help = "Server base URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new account")]
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    #[command(about = "Log in and remember the session token")]
    Connect {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    #[command(about = "Log out and forget the session token")]
    Disconnect,

    #[command(about = "Show the current user")]
    Me,

    #[command(about = "Upload a local file, or create a folder with --folder")]
    Upload {
        #[arg(help = "Path to the local file (omit with --folder)")]
        path: Option<String>,

        #[arg(short, long, help = "Name in the file tree (defaults to the file name)")]
        name: Option<String>,

        #[arg(long, help = "Create a folder instead of uploading content")]
        folder: bool,

        #[arg(long, help = "Upload as an image so thumbnails are generated")]
        image: bool,

        #[arg(long, default_value = "0", help = "Parent folder id")]
        parent: String,

        #[arg(long, help = "Make the file public")]
        public: bool,
    },

    #[command(about = "List files in a folder")]
    List {
        #[arg(long, default_value = "0", help = "Parent folder id")]
        parent: String,

        #[arg(long, default_value_t = 0)]
        page: usize,
    },

    #[command(about = "Make a file public")]
    Publish { id: String },

    #[command(about = "Make a file private")]
    Unpublish { id: String },

    #[command(about = "Download a file's content")]
    Get {
        id: String,

        #[arg(short, long, help = "Thumbnail width: 500, 250 or 100")]
        size: Option<u32>,

        #[arg(short, long, help = "Write to this path instead of stdout")]
        output: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResponse {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    is_public: bool,
    parent_id: Value,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(&cli.url, cli.command).await {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(url: &str, command: Commands) -> Result<()> {
    let client = Client::new();

    match command {
        Commands::Register { email, password } => register(&client, url, email, password).await,
        Commands::Connect { email, password } => connect(&client, url, email, password).await,
        Commands::Disconnect => disconnect(&client, url).await,
        Commands::Me => me(&client, url).await,
        Commands::Upload {
            path,
            name,
            folder,
            image,
            parent,
            public,
        } => upload(&client, url, path, name, folder, image, parent, public).await,
        Commands::List { parent, page } => list(&client, url, parent, page).await,
        Commands::Publish { id } => set_visibility(&client, url, &id, true).await,
        Commands::Unpublish { id } => set_visibility(&client, url, &id, false).await,
        Commands::Get { id, size, output } => download(&client, url, &id, size, output).await,
    }
}

fn load_token() -> Result<String> {
    let token = fs::read_to_string(TOKEN_FILE)
        .map_err(|_| anyhow::anyhow!("You must be connected. Use: files connect -e <email> -p <password>"))?;
    Ok(token.trim().to_string())
}

fn with_token(request: RequestBuilder) -> Result<RequestBuilder> {
    Ok(request.header("X-Token", load_token()?))
}

/// Turns a non-success response into an error carrying the server message.
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"].as_str().unwrap_or("request failed");
    bail!("{message} ({status})")
}

async fn register(client: &Client, url: &str, email: String, password: String) -> Result<()> {
    let response = client
        .post(format!("{url}/users"))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?;
    let user: UserResponse = check(response).await?.json().await?;

    println!("✅ Account created!");
    println!("👤 Email: {}", user.email);
    println!("🆔 User ID: {}", user.id);
    Ok(())
}

async fn connect(client: &Client, url: &str, email: String, password: String) -> Result<()> {
    let credentials = general_purpose::STANDARD.encode(format!("{email}:{password}"));
    let response = client
        .get(format!("{url}/connect"))
        .header("Authorization", format!("Basic {credentials}"))
        .send()
        .await?;
    let result: TokenResponse = check(response).await?.json().await?;

    fs::write(TOKEN_FILE, &result.token).context("Failed to save session token")?;
    println!("✅ Connected as {email}");
    Ok(())
}

async fn disconnect(client: &Client, url: &str) -> Result<()> {
    let response = with_token(client.get(format!("{url}/disconnect")))?
        .send()
        .await?;
    check(response).await?;

    let _ = fs::remove_file(TOKEN_FILE);
    println!("✅ Disconnected");
    Ok(())
}

async fn me(client: &Client, url: &str) -> Result<()> {
    let response = with_token(client.get(format!("{url}/users/me")))?
        .send()
        .await?;
    let user: UserResponse = check(response).await?.json().await?;

    println!("👤 {}", user.email);
    println!("🆔 {}", user.id);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upload(
    client: &Client,
    url: &str,
    path: Option<String>,
    name: Option<String>,
    folder: bool,
    image: bool,
    parent: String,
    public: bool,
) -> Result<()> {
    let mut body = json!({ "parentId": parent, "isPublic": public });

    if folder {
        let Some(name) = name.or(path) else {
            bail!("A folder needs a name");
        };
        body["name"] = json!(name);
        body["type"] = json!("folder");
    } else {
        let Some(path) = path else {
            bail!("Nothing to upload: give a file path or use --folder");
        };
        let content = fs::read(&path).with_context(|| format!("Failed to read {path}"))?;
        if content.is_empty() {
            bail!("Empty file detected: {path}");
        }

        let name = name.unwrap_or_else(|| {
            Path::new(&path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string()
        });
        body["name"] = json!(name);
        body["type"] = json!(if image { "image" } else { "file" });
        body["data"] = json!(general_purpose::STANDARD.encode(content));
    }

    let response = with_token(client.post(format!("{url}/files")))?
        .json(&body)
        .send()
        .await?;
    let file: FileResponse = check(response).await?.json().await?;

    println!("✅ Created {} '{}'", file.kind, file.name);
    println!("🆔 {}", file.id);
    Ok(())
}

async fn list(client: &Client, url: &str, parent: String, page: usize) -> Result<()> {
    let response = with_token(client.get(format!("{url}/files")))?
        .query(&[("parentId", parent), ("page", page.to_string())])
        .send()
        .await?;
    let files: Vec<FileResponse> = check(response).await?.json().await?;

    if files.is_empty() {
        println!("📭 No files on this page.");
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Name"),
        Cell::new("Type"),
        Cell::new("Public"),
        Cell::new("Parent"),
    ]));

    for file in files {
        let parent = match &file.parent_id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };
        table.add_row(Row::new(vec![
            Cell::new(&file.id),
            Cell::new(&file.name),
            Cell::new(&file.kind),
            Cell::new(if file.is_public { "yes" } else { "no" }),
            Cell::new(&parent),
        ]));
    }

    table.printstd();
    Ok(())
}

async fn set_visibility(client: &Client, url: &str, id: &str, public: bool) -> Result<()> {
    let action = if public { "publish" } else { "unpublish" };
    let response = with_token(client.put(format!("{url}/files/{id}/{action}")))?
        .send()
        .await?;
    let file: FileResponse = check(response).await?.json().await?;

    println!(
        "✅ '{}' is now {}",
        file.name,
        if file.is_public { "public" } else { "private" }
    );
    Ok(())
}

async fn download(
    client: &Client,
    url: &str,
    id: &str,
    size: Option<u32>,
    output: Option<String>,
) -> Result<()> {
    let mut request = client.get(format!("{url}/files/{id}/data"));
    if let Some(size) = size {
        request = request.query(&[("size", size)]);
    }
    if let Ok(token) = load_token() {
        request = request.header("X-Token", token);
    }

    let response = request.send().await?;
    if response.status() == StatusCode::NOT_FOUND && size.is_some() {
        bail!("Not found (the thumbnail may still be processing)");
    }
    let bytes = check(response).await?.bytes().await?;

    match output {
        Some(path) => {
            fs::write(&path, &bytes).with_context(|| format!("Failed to write {path}"))?;
            println!("✅ Saved {} bytes to {path}", bytes.len());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}
