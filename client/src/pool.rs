use courier_http::{BoxedTransport, Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Display, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use url::Url;

/// The tuple that partitions the connection pool: a connection dialed for
/// one origin is never handed out for another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Origin {
    host: String,
    port: u16,
    secure: bool,
}

impl Origin {
    pub(crate) fn from_url(url: &Url) -> Result<Self> {
        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return Err(Error::InvalidScheme),
        };

        let host = url
            .host_str()
            .ok_or(Error::InvalidUrl)?
            .to_ascii_lowercase();

        let port = url.port_or_known_default().ok_or(Error::InvalidUrl)?;

        Ok(Self { host, port, secure })
    }

    pub(crate) fn is_secure(&self) -> bool {
        self.secure
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}",
            if self.secure { "https" } else { "http" },
            self.host,
            self.port
        )
    }
}

/// A live transport together with the bookkeeping the pool needs.
///
/// A connection is exclusively owned by one in-flight exchange between
/// checkout and checkin. Anything that goes wrong mid-exchange drops the
/// connection instead of checking it in, so a free list only ever holds
/// connections whose last exchange completed cleanly.
pub(crate) struct Connection {
    pub(crate) transport: BoxedTransport,
    pub(crate) origin: Origin,
    pub(crate) created: Instant,
    pub(crate) last_used: Instant,
    pub(crate) reused: bool,
}

impl Connection {
    pub(crate) fn new(transport: BoxedTransport, origin: Origin) -> Self {
        let now = Instant::now();
        Self {
            transport,
            origin,
            created: now,
            last_used: now,
            reused: false,
        }
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("origin", &self.origin.to_string())
            .field("created", &self.created)
            .field("last_used", &self.last_used)
            .field("reused", &self.reused)
            .finish()
    }
}

#[derive(Default)]
struct FreeList(Mutex<VecDeque<Connection>>);

struct PoolInner {
    origins: DashMap<Origin, Arc<FreeList>>,
    max_idle_per_origin: usize,
    idle_window: Duration,
    closed: AtomicBool,
}

/// Per-origin free lists of idle, reusable connections.
///
/// Lists are most-recently-used ordered: checkin pushes the front,
/// checkout pops the front, so a warm socket stays warm. Entries idle
/// past the window are dropped at checkout.
#[derive(Clone)]
pub(crate) struct Pool(Arc<PoolInner>);

pub(crate) const DEFAULT_MAX_IDLE_PER_ORIGIN: usize = 8;
pub(crate) const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(90);

impl Pool {
    pub(crate) fn new(max_idle_per_origin: usize, idle_window: Duration) -> Self {
        Self(Arc::new(PoolInner {
            origins: DashMap::new(),
            max_idle_per_origin,
            idle_window,
            closed: AtomicBool::new(false),
        }))
    }

    /// Pop the most recently used healthy connection for this origin, if
    /// any. Idle-expired entries encountered on the way are dropped.
    pub(crate) fn checkout(&self, origin: &Origin) -> Option<Connection> {
        if self.is_closed() {
            return None;
        }

        let list = self.0.origins.get(origin)?.clone();
        let mut list = list.0.lock();
        while let Some(connection) = list.pop_front() {
            if connection.last_used.elapsed() > self.0.idle_window {
                log::debug!("dropping idle-expired connection to {origin}");
                continue;
            }
            return Some(connection);
        }
        None
    }

    /// Return a cleanly finished connection to its origin's free list,
    /// evicting the least recently used entry when the cap is reached.
    pub(crate) fn checkin(&self, mut connection: Connection) {
        if self.is_closed() {
            return;
        }

        connection.last_used = Instant::now();
        connection.reused = true;
        let origin = connection.origin.clone();
        log::debug!("pooling connection to {origin}");

        let list = self
            .0
            .origins
            .entry(origin)
            .or_insert_with(|| Arc::new(FreeList::default()))
            .clone();

        let mut list = list.0.lock();
        list.push_front(connection);
        while list.len() > self.0.max_idle_per_origin {
            list.pop_back();
        }
    }

    /// The number of idle connections currently pooled for this origin.
    #[cfg(test)]
    pub(crate) fn idle_count(&self, origin: &Origin) -> usize {
        self.0
            .origins
            .get(origin)
            .map(|list| list.0.lock().len())
            .unwrap_or_default()
    }

    /// Drop every pooled connection and refuse all further checkouts and
    /// checkins.
    pub(crate) fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.origins.clear();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

impl Debug for Pool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Pool");
        for entry in self.0.origins.iter() {
            s.field(&entry.key().to_string(), &entry.value().0.lock().len());
        }
        s.field("closed", &self.is_closed()).finish()
    }
}
