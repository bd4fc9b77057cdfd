//! Registers a member through the standard pipeline, then greets them.
//!
//! ```text
//! dispatch-demo Ada 36 --json-logs
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use clap::Parser;
use dashmap::DashMap;
use nexus_dispatch::{
    register_standard_behaviors, telemetry, Command, CommandHandler, DispatchConfig, Dispatcher,
    HandlerRegistry, Outcome, Query, QueryHandler, Scope, UnitOfWork, UnitOfWorkParticipant,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "dispatch-demo",
    about = "Dispatch a command and a query through the standard pipeline"
)]
struct Args {
    /// Member name.
    #[arg(default_value = "Ada")]
    name: String,
    /// Member age. Members under 18 are rejected.
    #[arg(default_value_t = 36)]
    age: u32,
    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "NEXUS_LOG", default_value = "info")]
    log_filter: String,
    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

struct RegisterMember {
    name: String,
    age: u32,
}

impl Command for RegisterMember {
    type Response = Uuid;
}

struct GreetMember {
    id: Uuid,
}

impl Query for GreetMember {
    type Response = String;
}

// ---------------------------------------------------------------------------
// MemberStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Member {
    name: String,
    age: u32,
}

/// In-memory member table shared by every scope.
#[derive(Default)]
struct MemberStore {
    members: DashMap<Uuid, Member>,
}

/// One staged registration, written to the store when its unit of work commits.
struct PendingMember {
    store: Arc<MemberStore>,
    id: Uuid,
    member: Mutex<Option<Member>>,
}

#[async_trait]
impl UnitOfWorkParticipant for PendingMember {
    async fn prepare(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if self.store.members.contains_key(&self.id) {
            anyhow::bail!("member {} already exists", self.id);
        }
        Ok(())
    }

    async fn commit(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if let Some(member) = self.member.lock().take() {
            self.store.members.insert(self.id, member);
        }
        Ok(())
    }

    async fn rollback(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        self.member.lock().take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

struct RegisterMemberHandler {
    store: Arc<MemberStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
}

#[async_trait]
impl CommandHandler<RegisterMember> for RegisterMemberHandler {
    async fn handle(
        &self,
        command: &RegisterMember,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Outcome<Uuid>> {
        if command.age < 18 {
            return Ok(Outcome::error("members must be 18 or older"));
        }

        let id = Uuid::new_v4();
        self.unit_of_work.enlist(Arc::new(PendingMember {
            store: Arc::clone(&self.store),
            id,
            member: Mutex::new(Some(Member {
                name: command.name.clone(),
                age: command.age,
            })),
        }))?;
        debug!(%id, "member staged");
        Ok(Outcome::success(id))
    }
}

struct GreetMemberHandler {
    store: Arc<MemberStore>,
}

#[async_trait]
impl QueryHandler<GreetMember> for GreetMemberHandler {
    async fn handle(
        &self,
        query: &GreetMember,
        _cancel: CancellationToken,
    ) -> anyhow::Result<Outcome<String>> {
        Ok(match self.store.members.get(&query.id) {
            Some(member) => Outcome::success(format!("Hello, {} ({})!", member.name, member.age)),
            None => Outcome::error(format!("member {} not found", query.id)),
        })
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = DispatchConfig {
        log_filter: args.log_filter,
        json_logs: args.json_logs,
        request_timeout_ms: args.timeout_ms,
    };
    telemetry::init_tracing(&config)?;

    let mut registry = HandlerRegistry::new();
    register_standard_behaviors(&mut registry, &config);
    registry
        .register_command_handler::<RegisterMember, _, _>(|scope| {
            Arc::new(RegisterMemberHandler {
                store: scope.get::<MemberStore>().unwrap_or_default(),
                unit_of_work: scope.unit_of_work(),
            })
        })
        .register_query_handler::<GreetMember, _, _>(|scope| {
            Arc::new(GreetMemberHandler {
                store: scope.get::<MemberStore>().unwrap_or_default(),
            })
        });

    let store = Arc::new(MemberStore::default());
    let dispatcher = Dispatcher::with_scopes(Arc::new(registry), move || {
        let scope = Scope::new();
        scope.insert(Arc::clone(&store));
        scope
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let registered = dispatcher
        .dispatch_command(
            RegisterMember {
                name: args.name,
                age: args.age,
            },
            cancel.clone(),
        )
        .await?;
    println!("{}", serde_json::to_string(&registered).context("encode outcome")?);

    if let Outcome::Success(id) = registered {
        let greeting = dispatcher
            .dispatch_query(GreetMember { id }, cancel)
            .await?;
        println!("{}", serde_json::to_string(&greeting).context("encode outcome")?);
    }

    Ok(())
}
