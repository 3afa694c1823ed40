use std::sync::{Arc, Once};
use std::thread;

use gantry::{Backend, Communicator, Context, GantryConfig, LocalFabric, Request};

static INIT_TRACING: Once = Once::new();

/// Per-rank handles for a collective test.
pub struct RankCtx {
    pub ctx: Arc<Context>,
    pub backend: Backend,
    pub comm: Communicator,
}

impl RankCtx {
    pub fn rank(&self) -> u32 {
        self.comm.rank()
    }

    pub fn size(&self) -> u32 {
        self.comm.size()
    }
}

/// Run `f` on `world_size` ranks, each with its own context, backend, and
/// device stream, all connected through one in-process fabric. Joins every
/// rank and propagates panics.
pub fn run_ranks<F>(world_size: u32, f: F)
where
    F: Fn(RankCtx) + Send + Sync + 'static,
{
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });

    let fabric = LocalFabric::new(world_size);
    let comms = fabric.world();
    let f = Arc::new(f);

    let handles: Vec<_> = comms
        .into_iter()
        .map(|transport| {
            let f = Arc::clone(&f);
            thread::spawn(move || {
                let ctx = Context::init(GantryConfig::default()).unwrap();
                let backend = Backend::new(Arc::clone(&ctx));
                let stream = ctx.create_stream();
                let comm = Communicator::new(Arc::new(transport), stream);
                f(RankCtx {
                    ctx: Arc::clone(&ctx),
                    backend,
                    comm,
                });
                ctx.finalize();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

/// Poll a request on the host until it reports complete.
pub fn await_request(req: &mut Request) {
    while !req.test().unwrap() {
        thread::yield_now();
    }
}
