//! Command line interface of the `convert` binary, built with clap's derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use engine_core::{OrderId, SortColumn, SortOrder, TableQuery};

fn parse_order_id(s: &str) -> Result<OrderId, String> {
    s.parse::<OrderId>().map_err(|e| format!("{:#}", e))
}

#[derive(Debug, Parser)]
#[command(about, version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, short, default_value = "convert.json")]
    pub config: PathBuf,

    /// Print prometheus metrics after the command finishes
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List tokens, or the tokens directly tradable against TOKEN.
    Pairs { token: Option<String> },

    /// Show the spendable balance of FROM on the FROM/TO market.
    Balance {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// Convert FROM into TO with an immediate-or-cancel order.
    Swap(SwapArgs),

    /// List open orders.
    Orders(OrdersArgs),

    /// Cancel one open order.
    Cancel {
        #[arg(value_parser = parse_order_id)]
        order_id: OrderId,
        /// Market name, e.g. SOL/USDC
        #[arg(long)]
        market: String,
    },

    /// Add a custom market to the configuration file.
    AddMarket {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        program_id: String,
        #[arg(long)]
        base_label: Option<String>,
        #[arg(long)]
        quote_label: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct SwapArgs {
    #[arg(long)]
    pub from: String,
    #[arg(long)]
    pub to: String,
    /// Amount of FROM to convert
    #[arg(long, required_unless_present = "max", conflicts_with = "max")]
    pub size: Option<f64>,
    /// Convert the whole spendable balance
    #[arg(long)]
    pub max: bool,
    /// Show the order without sending it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    Side,
    Size,
    Price,
}

impl From<SortKey> for SortColumn {
    fn from(k: SortKey) -> Self {
        match k {
            SortKey::Side => SortColumn::Side,
            SortKey::Size => SortColumn::Size,
            SortKey::Price => SortColumn::Price,
        }
    }
}

#[derive(Debug, Args)]
pub struct OrdersArgs {
    /// Only markets whose name starts with this
    #[arg(long)]
    pub market: Option<String>,
    #[arg(long, value_enum)]
    pub sort: Option<SortKey>,
    /// Reverse the sort order
    #[arg(long, requires = "sort")]
    pub desc: bool,
    /// Zero-based page
    #[arg(long, default_value_t = 0)]
    pub page: usize,
}

impl OrdersArgs {
    pub fn query(&self) -> TableQuery {
        let order = if self.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        TableQuery {
            market: self.market.clone(),
            sort: self.sort.map(|k| (k.into(), order)),
            page: self.page,
        }
    }
}
