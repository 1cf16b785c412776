use anyhow::{Context, bail};
use clap::Parser;
use snowgrid::{
    CUSTOM_EPOCH, ClientKind, DEFAULT_WORKER_BITS, IdKind, Settings, StaticAssignments,
};
use std::{net::Ipv4Addr, path::PathBuf};

/// Mint or decode coordinated Snowflake-style IDs.
///
/// Every option can also be set through its environment variable, or through
/// a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "snowgrid", version, about = "Mint and decode coordinated Snowflake-style IDs")]
pub struct CliArgs {
    /// Epoch subtracted from every timestamp, in milliseconds since
    /// 1970-01-01 UTC. Must not lie in the future.
    ///
    /// Environment variable: `SNOWGRID_START_TIME`
    #[arg(long, env = "SNOWGRID_START_TIME", default_value_t = CUSTOM_EPOCH)]
    pub start_time: u64,

    /// Bits given to the worker ID out of the ten shared with the data center
    /// ID, within [1, 9].
    ///
    /// Environment variable: `SNOWGRID_WORKER_BITS`
    #[arg(long, env = "SNOWGRID_WORKER_BITS", default_value_t = DEFAULT_WORKER_BITS)]
    pub worker_bits: u8,

    /// How this process obtains its worker: `fixed` or `static`.
    ///
    /// `network` needs an application specific authority and is only
    /// available through the library.
    ///
    /// Environment variable: `SNOWGRID_CLIENT`
    #[arg(long, env = "SNOWGRID_CLIENT", default_value = "fixed")]
    pub client: ClientKind,

    /// JSON file mapping private IPv4 addresses to workers, required by the
    /// `static` client.
    ///
    /// Environment variable: `SNOWGRID_ASSIGNMENTS`
    #[arg(long, env = "SNOWGRID_ASSIGNMENTS")]
    pub assignments: Option<PathBuf>,

    /// Address to look up in the assignment table instead of this host's
    /// private IPv4.
    ///
    /// Environment variable: `SNOWGRID_HOST_IP`
    #[arg(long, env = "SNOWGRID_HOST_IP")]
    pub host_ip: Option<Ipv4Addr>,

    /// Number of IDs to mint.
    #[arg(short = 'n', long, env = "SNOWGRID_COUNT", default_value_t = 1)]
    pub count: usize,

    /// Representation of the minted IDs: `integer`, `string` or `bigint`.
    #[arg(short, long, default_value = "integer")]
    pub kind: IdKind,

    /// Suffix number appended to `string` and `bigint` IDs, kept modulo
    /// 100000.
    #[arg(short, long)]
    pub suffix: Option<i64>,

    /// Decode these IDs instead of minting new ones.
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    pub decode: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub settings: Settings,
    pub client: ClientKind,
    pub assignments: StaticAssignments,
    pub host_ip: Option<Ipv4Addr>,
    pub count: usize,
    pub kind: IdKind,
    pub suffix: Option<i64>,
    pub decode: Vec<i64>,
}

impl TryFrom<CliArgs> for NodeConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let settings = Settings::new(args.start_time, args.worker_bits);
        settings.layout()?;

        if args.count == 0 {
            bail!("--count must be greater than 0");
        }

        if let Some(suffix) = args.suffix {
            if suffix < 0 {
                bail!("--suffix must be >= 0, got {suffix}");
            }
            if args.kind == IdKind::Integer {
                bail!("--suffix only applies to `string` and `bigint` IDs");
            }
        }

        let assignments = match (&args.assignments, args.client) {
            (_, ClientKind::Network) => bail!(
                "the network client needs a coordination authority; use `fixed` or `static`"
            ),
            (None, ClientKind::Static) => {
                bail!("the static client needs an assignment table (SNOWGRID_ASSIGNMENTS)")
            }
            (Some(path), _) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading assignments from {}", path.display()))?;
                StaticAssignments::from_json(&json)
                    .with_context(|| format!("parsing assignments in {}", path.display()))?
            }
            (None, ClientKind::Fixed) => StaticAssignments::default(),
        };

        Ok(Self {
            settings,
            client: args.client,
            assignments,
            host_ip: args.host_ip,
            count: args.count,
            kind: args.kind,
            suffix: args.suffix,
            decode: args.decode,
        })
    }
}
