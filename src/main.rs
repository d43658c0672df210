use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use log::{info, warn, LevelFilter};
use proxy_probe::{
    proxy::{oracle, report},
    tui::ProbeMonitorApp,
    CandidateParser, Config, EchoOracle, ProbePool, ProbeResult, ProxyProber, ReportFormat,
    DEFAULT_OUTPUT_FILE, DEFAULT_PROXY_FILE,
};
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// A concurrent proxy checker that grades proxies by anonymity level
#[derive(Parser)]
#[command(name = "proxy-probe")]
#[command(about = "A concurrent proxy checker that grades proxies by anonymity level")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every proxy in a list and save the working ones
    Check(ProbeArgs),
    /// Probe with an interactive progress display
    Monitor(ProbeArgs),
    /// Run only the echo oracle until interrupted
    Serve {
        /// Local address to bind (defaults to this machine's LAN address)
        #[arg(long)]
        bind: Option<IpAddr>,
        /// Port to listen on
        #[arg(short, long, default_value = "80")]
        port: u16,
    },
}

#[derive(Args)]
struct ProbeArgs {
    /// Externally visible IP address of this machine
    #[arg(long)]
    wanip: String,
    /// Port the echo oracle listens on
    #[arg(short, long, default_value = "80")]
    port: u16,
    /// Timeout in seconds for each probe
    #[arg(long, default_value = "1.0")]
    timeout: f64,
    /// Number of concurrent probes
    #[arg(short = 'n', long, default_value = "8")]
    threads: usize,
    /// File containing one host:port per line
    #[arg(short, long, default_value = DEFAULT_PROXY_FILE)]
    file: PathBuf,
    /// Output file for classified proxies
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,
    /// Output format (csv, txt)
    #[arg(long, default_value = "csv")]
    format: String,
    /// Local address to bind the oracle to (defaults to this machine's LAN address)
    #[arg(long)]
    bind: Option<IpAddr>,
}

impl ProbeArgs {
    fn into_config(self) -> Result<Config> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            anyhow::bail!("Timeout must be a positive number of seconds");
        }
        let timeout = match Duration::try_from_secs_f64(self.timeout) {
            Ok(timeout) => timeout,
            Err(_) => anyhow::bail!("Timeout of {} seconds is out of range", self.timeout),
        };
        let mut config = Config::new(self.wanip);
        config.oracle_port = self.port;
        config.bind_ip = self.bind;
        config.timeout = timeout;
        config.concurrency = self.threads.max(1);
        config.proxy_file = self.file;
        config.output = self.output;
        config.format = self.format.parse::<ReportFormat>()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    match cli.command {
        Commands::Check(args) => {
            let config = args.into_config()?;
            let oracle = start_oracle(&config)?;
            run_check(&config).await?;
            oracle.shutdown().await?;
        }
        Commands::Monitor(args) => {
            let config = args.into_config()?;
            let oracle = start_oracle(&config)?;
            let candidates = CandidateParser::parse_file(&config.proxy_file)?;
            info!("Loaded {} candidates from {:?}", candidates.len(), config.proxy_file);

            let mut app = ProbeMonitorApp::new(candidates, config.clone());
            let results = app.run().await?;
            save_results(&results, &config)?;
            oracle.shutdown().await?;
        }
        Commands::Serve { bind, port } => {
            let ip = match bind {
                Some(ip) => ip,
                None => oracle::lan_address()?,
            };
            let oracle = EchoOracle::bind(SocketAddr::new(ip, port))?;
            println!("Starting server on: {}", oracle.local_addr());

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl_c")?;
            oracle.shutdown().await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, log_file: Option<&PathBuf>) -> Result<()> {
    let default_level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    if let Some(path) = log_file {
        let file = File::create(path).with_context(|| format!("failed to create log file {:?}", path))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn start_oracle(config: &Config) -> Result<EchoOracle> {
    let addr = config.oracle_addr()?;
    let oracle = EchoOracle::bind(addr)?;
    println!("Starting server on: {}", oracle.local_addr());
    Ok(oracle)
}

async fn run_check(config: &Config) -> Result<()> {
    let candidates = CandidateParser::parse_file(&config.proxy_file)?;
    let total = candidates.len();

    println!("Loaded {} proxies from {:?}", total, config.proxy_file);
    println!(
        "Checking with {} threads, timeout: {:.1}s",
        config.concurrency,
        config.timeout.as_secs_f64()
    );
    println!("Oracle URL: {}", config.prober_config().oracle_url());
    println!();

    let start = Instant::now();
    let prober = ProxyProber::new(config.prober_config());
    let pool = ProbePool::with_prober(prober, config.concurrency, None);
    pool.enqueue_all(candidates);

    let interrupted = tokio::select! {
        _ = pool.drained() => false,
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl_c")?;
            true
        }
    };

    let results = if interrupted {
        warn!(
            "Interrupted with {} of {} proxies checked, saving partial results",
            pool.completed(),
            total
        );
        pool.abandon().await
    } else {
        pool.join().await
    };

    save_results(&results, config)?;

    for (level, count) in report::level_counts(&results) {
        println!("  {:<12} {}", level, count);
    }
    println!("Runtime: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn save_results(results: &[ProbeResult], config: &Config) -> Result<()> {
    report::save_to_file(results, &config.output, config.format)?;
    println!(
        "Saved {} working proxies to {:?}",
        results.len(),
        config.output
    );
    Ok(())
}
