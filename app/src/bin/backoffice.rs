use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use backoffice::catalog::{CloneProduct, ListCategories, ListProducts, ProductFilter};
use backoffice::config::{Config, EnvLogger};
use backoffice::errors::CmsError;
use backoffice::events::ListEvents;
use backoffice::expenses::{DateRange, ListExpenses, SummarizeExpenses};
use backoffice::orders::{
    ListOrderQueue, NotificationFeed, OrderStatus, PollNewOrders, UpdateOrderStatus,
};
use backoffice::recipes::{CreateRecipe, DeleteRecipe, GroupRecipes, ListRecipeTargets, RecipeForm};
use backoffice::services::{Commandable, Queryable};
use backoffice::Backoffice;

use jemallocator_global as _;

#[derive(Debug, StructOpt)]
#[structopt(name = "backoffice", about = "Coffee shop back office")]
struct Opt {
    /// TOML configuration file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Create the schema")]
    Setup,
    #[structopt(name = "categories", about = "List categories")]
    Categories {
        #[structopt(long = "active")]
        active_only: bool,
    },
    #[structopt(name = "products", about = "Products and variants")]
    Products(ProductCommands),
    #[structopt(name = "recipes", about = "Portion control recipes")]
    Recipes(RecipeCommands),
    #[structopt(name = "orders", about = "Order queue")]
    Orders(OrderCommands),
    #[structopt(name = "events", about = "List events")]
    Events {
        #[structopt(long = "published")]
        published_only: bool,
    },
    #[structopt(name = "expenses", about = "Expenses")]
    Expenses(ExpenseCommands),
}

#[derive(Debug, StructOpt)]
enum ProductCommands {
    #[structopt(name = "list")]
    List {
        #[structopt(long = "category")]
        category: Option<String>,
        #[structopt(long = "search")]
        search: Option<String>,
        #[structopt(long = "active")]
        active_only: bool,
    },
    #[structopt(name = "clone")]
    Duplicate { id: String },
}

#[derive(Debug, StructOpt)]
enum RecipeCommands {
    #[structopt(name = "targets", about = "Products and variants without a recipe")]
    Targets {
        /// Keep this recipe's own target in the list
        #[structopt(long = "editing")]
        editing: Option<String>,
    },
    #[structopt(name = "groups", about = "Recipes by category")]
    Groups,
    #[structopt(name = "create", about = "Create a recipe from a JSON file")]
    Create {
        #[structopt(parse(from_os_str))]
        form: PathBuf,
    },
    #[structopt(name = "delete")]
    Delete { id: String },
}

#[derive(Debug, StructOpt)]
enum OrderCommands {
    #[structopt(name = "queue")]
    Queue,
    #[structopt(name = "status")]
    Status { id: String, status: String },
    #[structopt(name = "poll", about = "Show orders placed after a time")]
    Poll {
        /// RFC 3339 timestamp
        #[structopt(long = "since")]
        since: Option<String>,
    },
}

#[derive(Debug, StructOpt)]
enum ExpenseCommands {
    #[structopt(name = "list")]
    List {
        #[structopt(long = "from")]
        from: Option<NaiveDate>,
        #[structopt(long = "to")]
        to: Option<NaiveDate>,
    },
    #[structopt(name = "summary")]
    Summary {
        #[structopt(long = "from")]
        from: Option<NaiveDate>,
        #[structopt(long = "to")]
        to: Option<NaiveDate>,
    },
}

#[derive(Deserialize, Debug)]
struct FileConfig {
    #[serde(flatten)]
    backoffice: Config,
    #[serde(default)]
    env_logger: EnvLogger,
}

fn read_to_string(path: &Path) -> Result<String> {
    let mut buf = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut buf))
        .with_context(|| format!("Read {:?}", path))?;
    Ok(buf)
}

fn main() {
    if let Err(e) = run(Opt::from_args()) {
        match e.downcast_ref::<CmsError>() {
            Some(cms) => eprintln!("{}", cms),
            None => eprintln!("Error: {:?}", e),
        }
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    let config: FileConfig = toml::from_str(&read_to_string(&opt.config)?).context("Parse config")?;
    config.env_logger.builder().init();
    let config = config.backoffice.with_env_overrides()?;

    let bo = Backoffice::new(&config)?;
    debug!("Running {:?}", opt.command);

    match opt.command {
        Commands::Setup => bo.setup()?,
        Commands::Categories { active_only } => {
            for c in bo.categories().query(ListCategories { active_only })? {
                let state = if c.is_active { "active" } else { "inactive" };
                println!("{}\t{}\t{}", c.id, c.name, state);
            }
        }
        Commands::Products(ProductCommands::List {
            category,
            search,
            active_only,
        }) => {
            let category_id = category.map(|c| c.parse()).transpose()?;
            let filter = ProductFilter {
                category_id,
                search,
                active_only,
            };
            for p in bo.products().query(ListProducts(filter))? {
                println!("{}\t{}\t{}", p.id, p.name, p.sku.unwrap_or_default());
            }
        }
        Commands::Products(ProductCommands::Duplicate { id }) => {
            let detail = bo.products().execute(CloneProduct(id.parse()?))?;
            println!("{}\t{}", detail.product.id, detail.product.name);
        }
        Commands::Recipes(RecipeCommands::Targets { editing }) => {
            let editing = editing.map(|id| id.parse()).transpose()?;
            for t in bo.recipes().query(ListRecipeTargets { editing })? {
                println!("{}", t.label);
            }
        }
        Commands::Recipes(RecipeCommands::Groups) => {
            for group in bo.recipes().query(GroupRecipes)? {
                println!("{}", group.name);
                for s in group.recipes {
                    println!("\t{}\t{}\t{} ingredients", s.recipe.id, s.recipe.name, s.item_count);
                }
            }
        }
        Commands::Recipes(RecipeCommands::Create { form }) => {
            let form: RecipeForm =
                serde_json::from_str(&read_to_string(&form)?).context("Parse recipe")?;
            let detail = bo.recipes().execute(CreateRecipe(form))?;
            println!("{}", detail.recipe.id);
        }
        Commands::Recipes(RecipeCommands::Delete { id }) => {
            bo.recipes().execute(DeleteRecipe(id.parse()?))?
        }
        Commands::Orders(OrderCommands::Queue) => {
            for o in bo.orders().query(ListOrderQueue)? {
                println!("{}\t{}\t{}\t{:.2}", o.created_at, o.order_number, o.status, o.total);
            }
        }
        Commands::Orders(OrderCommands::Status { id, status }) => {
            let status = status.parse::<OrderStatus>()?;
            let order = bo.orders().execute(UpdateOrderStatus {
                id: id.parse()?,
                status,
            })?;
            println!("{}\t{}", order.order_number, order.status);
        }
        Commands::Orders(OrderCommands::Poll { since }) => {
            let since = since
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
                .transpose()?;
            let mut feed = NotificationFeed::new();
            feed.ingest(&bo.orders().query(PollNewOrders { since })?);
            for n in feed.notifications() {
                println!("{}\t{}\t{:.2}", n.created_at, n.order_number, n.total);
            }
            if let Some(last_seen) = feed.last_seen() {
                println!("next --since {}", last_seen.to_rfc3339());
            }
        }
        Commands::Events { published_only } => {
            for e in bo.events().query(ListEvents { published_only })? {
                let date = e.event_date.map(|d| d.to_string()).unwrap_or_default();
                println!("{}\t{}\t{}", e.id, date, e.title);
            }
        }
        Commands::Expenses(ExpenseCommands::List { from, to }) => {
            for e in bo.expenses().query(ListExpenses(DateRange { from, to }))? {
                println!("{}\t{}\t{:.2}\t{}", e.expense_date, e.category, e.amount, e.description);
            }
        }
        Commands::Expenses(ExpenseCommands::Summary { from, to }) => {
            let summary = bo.expenses().query(SummarizeExpenses(DateRange { from, to }))?;
            for t in summary.by_category {
                println!("{}\t{:.2}\t({})", t.category, t.total, t.count);
            }
            println!("Total\t{:.2}", summary.total);
        }
    }

    Ok(())
}
