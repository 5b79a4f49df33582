use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use airdrop_merkle_core::{
    build_with, hash_to_hex, parse_amount, parse_hash, resolve, verify_with, Address, LeafEncoding,
};
use airdrop_server::{
    build_router,
    chain::{CampaignFactory, ChainClient, HttpTransport, RpcSigner, Signer},
    claim::{ClaimOrchestrator, ClaimRequest},
    estimate,
    feed::{load_tree_file, FeedClient},
    recipients::load_recipients,
    state::{AppState, TreeSource},
    EngineConfig,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;

#[derive(Debug, Parser)]
#[command(name = "airdrop-server")]
#[command(about = "Merkle airdrop eligibility and claim engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    /// `(uint256 index, address, uint256 amount)` leaves.
    Indexed,
    /// `(address, uint256 amount)` leaves.
    AddressAmount,
}

impl From<EncodingArg> for LeafEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Indexed => LeafEncoding::IndexAddressAmount,
            EncodingArg::AddressAmount => LeafEncoding::AddressAmount,
        }
    }
}

#[derive(Debug, Args)]
struct ChainArgs {
    /// Ethereum JSON-RPC URL.
    #[arg(long, env = "RPC_URL")]
    rpc_url: String,

    /// Campaign contract address.
    #[arg(long, env = "CAMPAIGN_ADDRESS")]
    campaign: Address,

    /// Expected chain id; read from the node when omitted.
    #[arg(long, env = "CHAIN_ID")]
    chain_id: Option<u64>,
}

#[derive(Debug, Args)]
struct TreeArgs {
    /// Tree dump or distribution feed on disk.
    #[arg(long, conflicts_with = "feed_url")]
    tree: Option<PathBuf>,

    /// URL of a published distribution feed.
    #[arg(long, env = "FEED_URL")]
    feed_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a tree from a recipient list and write it out.
    Build {
        /// JSON array of {address, amount} or CSV rows `address,amount`.
        #[arg(long)]
        recipients: PathBuf,
        #[arg(long, default_value = "tree.json")]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "indexed")]
        encoding: EncodingArg,
    },
    /// Print the eligibility record (index, amount, proof) for an address.
    Proof {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        address: Address,
    },
    /// Re-verify an address's proof, optionally against an external root.
    Verify {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        address: Address,
        /// Root to verify against instead of the tree's own.
        #[arg(long)]
        root: Option<String>,
        /// Amount to check instead of the allocated one.
        #[arg(long)]
        amount: Option<String>,
    },
    /// Detect which kind of campaign lives at an address.
    Detect {
        #[command(flatten)]
        chain: ChainArgs,
    },
    /// Claim an allocation through a node-managed sender account.
    Claim {
        #[command(flatten)]
        chain: ChainArgs,
        #[command(flatten)]
        source: TreeArgs,
        /// Account that signs and pays.
        #[arg(long, env = "SENDER")]
        sender: Address,
        /// Allocation to claim; defaults to the sender.
        #[arg(long)]
        recipient: Option<Address>,
        /// Only print the fee and gas estimate.
        #[arg(long)]
        estimate_only: bool,
        #[arg(long, default_value = "2000")]
        poll_interval_ms: u64,
        #[arg(long, default_value = "90")]
        max_confirmation_polls: u32,
    },
    /// Admin-only campaign calls.
    Admin {
        #[command(flatten)]
        chain: ChainArgs,
        #[arg(long, env = "SENDER")]
        sender: Address,
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Run the HTTP/WebSocket API.
    Serve {
        #[arg(long, default_value = "3000")]
        port: u16,
        #[arg(long, env = "RPC_URL")]
        rpc_url: Option<String>,
        #[arg(long, env = "CAMPAIGN_ADDRESS")]
        campaign: Option<Address>,
        #[arg(long, env = "CHAIN_ID")]
        chain_id: Option<u64>,
        #[command(flatten)]
        source: TreeArgs,
        /// Enables `POST /api/claims` using this node-managed account.
        #[arg(long, env = "SENDER")]
        sender: Option<Address>,
        #[arg(long, default_value = "300")]
        cache_ttl_secs: u64,
        #[arg(long, default_value = "2000")]
        poll_interval_ms: u64,
        #[arg(long, default_value = "90")]
        max_confirmation_polls: u32,
    },
}

#[derive(Debug, Subcommand)]
enum AdminAction {
    /// Return unclaimed tokens.
    Clawback {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: String,
    },
    TransferAdmin {
        #[arg(long)]
        new_admin: Address,
    },
    /// Factory only.
    CollectFees {
        #[arg(long)]
        factory_admin: Address,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airdrop_server=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Build {
            recipients,
            out,
            encoding,
        } => cmd_build(&recipients, &out, encoding.into()),
        Command::Proof { tree, address } => cmd_proof(&tree, &address),
        Command::Verify {
            tree,
            address,
            root,
            amount,
        } => cmd_verify(&tree, &address, root.as_deref(), amount.as_deref()),
        Command::Detect { chain } => cmd_detect(&chain).await,
        Command::Claim {
            chain,
            source,
            sender,
            recipient,
            estimate_only,
            poll_interval_ms,
            max_confirmation_polls,
        } => {
            let config = EngineConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_confirmation_polls,
                ..EngineConfig::default()
            };
            cmd_claim(&chain, &source, sender, recipient.unwrap_or(sender), estimate_only, config).await
        }
        Command::Admin { chain, sender, action } => cmd_admin(&chain, sender, action).await,
        Command::Serve {
            port,
            rpc_url,
            campaign,
            chain_id,
            source,
            sender,
            cache_ttl_secs,
            poll_interval_ms,
            max_confirmation_polls,
        } => {
            let config = EngineConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_confirmation_polls,
                cache_ttl: Duration::from_secs(cache_ttl_secs),
                ..EngineConfig::default()
            };
            cmd_serve(port, rpc_url, campaign, chain_id, source, sender, config).await
        }
    }
}

fn cmd_build(recipients_path: &Path, out: &Path, encoding: LeafEncoding) -> Result<()> {
    let recipients = load_recipients(recipients_path)?;
    let tree = build_with(encoding, &recipients).context("failed to build tree")?;
    tree.write_to(out).context("failed to write tree")?;

    println!("Recipients: {}", tree.len());
    if let Some(total) = tree.total_amount() {
        println!("Total:      {}", total);
    }
    println!("Root:       {}", hash_to_hex(&tree.root()));
    println!("Tree:       {}", out.display());
    Ok(())
}

fn cmd_proof(tree_path: &Path, address: &Address) -> Result<()> {
    let tree = load_tree_file(tree_path)?;
    let record = resolve(address, &tree).ok_or_else(|| anyhow!("{} is not eligible", address))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_verify(tree_path: &Path, address: &Address, root: Option<&str>, amount: Option<&str>) -> Result<()> {
    let tree = load_tree_file(tree_path)?;
    let record = resolve(address, &tree).ok_or_else(|| anyhow!("{} is not eligible", address))?;

    let root = match root {
        Some(hex) => parse_hash(hex).context("invalid --root")?,
        None => tree.root(),
    };
    let amount = match amount {
        Some(a) => parse_amount(a).context("invalid --amount")?,
        None => record.amount,
    };

    let valid = verify_with(tree.encoding(), &root, &record.proof, record.index, address, amount);
    println!("Root:   {}", hash_to_hex(&root));
    println!("Index:  {}", record.index);
    println!("Amount: {}", amount);
    println!("Valid:  {}", valid);
    if !valid {
        bail!("proof does not verify");
    }
    Ok(())
}

async fn connect(chain: &ChainArgs) -> Result<CampaignFactory<HttpTransport>> {
    let client = ChainClient::http(&chain.rpc_url);
    let node_chain_id = client
        .chain_id()
        .await
        .with_context(|| format!("eth_chainId failed on {}", chain.rpc_url))?;
    if let Some(expected) = chain.chain_id {
        if expected != node_chain_id {
            bail!("RPC serves chain {} but --chain-id is {}", node_chain_id, expected);
        }
    }
    tracing::info!(rpc_url = %chain.rpc_url, chain_id = node_chain_id, "RPC endpoint configured");
    Ok(CampaignFactory::new(client, node_chain_id))
}

async fn cmd_detect(chain: &ChainArgs) -> Result<()> {
    let factory = connect(chain).await?;
    let campaign = factory.create_auto(&chain.campaign).await?;

    println!("Campaign: {}", campaign.address());
    println!("Chain:    {}", factory.chain_id());
    println!("Variant:  {}", campaign.variant());
    match campaign.base().campaign_name().await {
        Ok(name) => println!("Name:     {}", name),
        Err(e) => tracing::warn!(error = %e, "campaignName() unavailable"),
    }
    Ok(())
}

async fn load_source(source: &TreeArgs, ttl: Duration) -> Result<TreeSource> {
    Ok(match (&source.tree, &source.feed_url) {
        (Some(path), _) => TreeSource::Static(Arc::new(load_tree_file(path)?)),
        (None, Some(url)) => {
            let client = FeedClient::new(ttl);
            // Fail fast on a bad feed rather than on the first request.
            client.tree(url).await?;
            TreeSource::Feed {
                client,
                url: url.clone(),
            }
        }
        (None, None) => TreeSource::Missing,
    })
}

async fn cmd_claim(
    chain: &ChainArgs,
    source: &TreeArgs,
    sender: Address,
    recipient: Address,
    estimate_only: bool,
    config: EngineConfig,
) -> Result<()> {
    let factory = connect(chain).await?;
    let campaign = factory.create_auto(&chain.campaign).await?;

    let tree = match load_source(source, config.cache_ttl).await? {
        TreeSource::Static(tree) => tree,
        TreeSource::Feed { client, url } => client.tree(&url).await?,
        TreeSource::Missing => bail!("pass --tree or --feed-url"),
    };

    let onchain_root = campaign.base().merkle_root().await?;
    if onchain_root != tree.root() {
        bail!(
            "tree root {} does not match campaign root {}",
            hash_to_hex(&tree.root()),
            hash_to_hex(&onchain_root)
        );
    }

    let record = resolve(&recipient, &tree).ok_or_else(|| anyhow!("{} is not eligible", recipient))?;
    let request = ClaimRequest::from(record);

    if estimate_only {
        let est = estimate::estimate(&campaign, sender, &request).await?;
        println!("{}", serde_json::to_string_pretty(&est)?);
        return Ok(());
    }

    let (event_tx, _) = broadcast::channel::<String>(64);
    let signer = Arc::new(RpcSigner::new(factory.client().clone(), sender));
    let orchestrator = ClaimOrchestrator::new(campaign, Some(signer), tree.encoding(), config, event_tx);

    let mut updates = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            println!("[{}] {}", snapshot.state.as_str(), snapshot.message);
        }
    });

    let outcome = orchestrator.claim(request).await;
    drop(orchestrator);
    let _ = progress.await;

    let tx = outcome?;
    if let Some(hash) = tx.hash {
        println!("Transaction: {}", hash_to_hex(&hash));
    }
    if let Some(stream_id) = tx.stream_id {
        println!("Stream:      {}", stream_id);
    }
    Ok(())
}

async fn cmd_admin(chain: &ChainArgs, sender: Address, action: AdminAction) -> Result<()> {
    let factory = connect(chain).await?;
    let campaign = factory.create_auto(&chain.campaign).await?;
    let signer = RpcSigner::new(factory.client().clone(), sender);
    let base = campaign.base();

    let hash = match action {
        AdminAction::Clawback { to, amount } => {
            let amount = parse_amount(&amount).context("invalid --amount")?;
            base.clawback(&signer, to, amount).await?
        }
        AdminAction::TransferAdmin { new_admin } => base.transfer_admin(&signer, new_admin).await?,
        AdminAction::CollectFees { factory_admin } => base.collect_fees(&signer, factory_admin).await?,
    };
    println!("Sent {} from {}", hash_to_hex(&hash), signer.address());
    Ok(())
}

async fn cmd_serve(
    port: u16,
    rpc_url: Option<String>,
    campaign: Option<Address>,
    chain_id: Option<u64>,
    source: TreeArgs,
    sender: Option<Address>,
    config: EngineConfig,
) -> Result<()> {
    tracing::info!(port, "starting airdrop-server");

    // Broadcast channel for WebSocket events (claim progress, estimates)
    let (event_tx, _) = broadcast::channel::<String>(64);

    let tree_source = load_source(&source, config.cache_ttl).await?;
    // Claims are checked against the campaign root with the tree's leaf layout.
    let encoding = match &tree_source {
        TreeSource::Static(tree) => tree.encoding(),
        TreeSource::Feed { client, url } => client.tree(url).await?.encoding(),
        TreeSource::Missing => LeafEncoding::default(),
    };

    let (campaign, orchestrator) = match (rpc_url, campaign) {
        (Some(rpc_url), Some(address)) => {
            let chain = ChainArgs {
                rpc_url,
                campaign: address,
                chain_id,
            };
            let factory = connect(&chain).await?;
            let campaign = factory.create_auto(&address).await?;
            let orchestrator = sender.map(|sender| {
                let signer = Arc::new(RpcSigner::new(factory.client().clone(), sender));
                ClaimOrchestrator::new(
                    campaign.clone(),
                    Some(signer),
                    encoding,
                    config.clone(),
                    event_tx.clone(),
                )
            });
            (Some(campaign), orchestrator)
        }
        (None, None) => (None, None),
        _ => bail!("--rpc-url and --campaign must be given together"),
    };

    let state = Arc::new(AppState::new(tree_source, campaign, orchestrator, config, event_tx));

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
