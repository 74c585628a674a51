use models::{Author, Info, Kind, Paper, Relation, Venue};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use weaver::{DataSource, Destination};

/// Scripted outcomes for one data-source method, keyed by any of the
/// probed entity's identifiers. Each key holds a queue of outcomes;
/// the last outcome repeats once the queue drains, and `None` means
/// "fail this call".
pub struct Responses<T: Clone> {
    map: Mutex<HashMap<String, VecDeque<Option<T>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl<T: Clone> Default for Responses<T> {
    fn default() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Responses<T> {
    pub fn set(&self, key: &str, value: T) {
        self.push(key, Some(value));
    }

    pub fn fail_once(&self, key: &str) {
        self.push(key, None);
    }

    pub fn push(&self, key: &str, outcome: Option<T>) {
        self.map
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Calls observed for `key`, over every scripted outcome.
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn take(&self, identifiers: &BTreeSet<String>) -> anyhow::Result<T> {
        let mut map = self.map.lock().unwrap();
        for id in identifiers {
            let Some(queue) = map.get_mut(id) else {
                continue;
            };
            *self.calls.lock().unwrap().entry(id.clone()).or_default() += 1;
            let outcome = if queue.len() > 1 {
                queue.pop_front().expect("queue is non-empty")
            } else {
                queue.front().expect("queue is non-empty").clone()
            };
            return outcome.ok_or_else(|| anyhow::anyhow!("scripted failure for {id}"));
        }
        anyhow::bail!("no scripted response for {identifiers:?}")
    }
}

#[derive(Default)]
pub struct MockSource {
    pub paper_info: Responses<(Paper, Info)>,
    pub author_info: Responses<(Author, Info)>,
    pub venue_info: Responses<(Venue, Info)>,
    pub paper_authors: Responses<Vec<Author>>,
    pub paper_venues: Responses<Vec<Venue>>,
    pub paper_references: Responses<Vec<Paper>>,
    pub paper_citations: Responses<Vec<Paper>>,
    pub author_papers: Responses<Vec<Paper>>,
    pub venue_papers: Responses<Vec<Paper>>,
}

#[async_trait::async_trait]
impl DataSource for MockSource {
    async fn paper_info(&self, paper: &Paper) -> anyhow::Result<(Paper, Info)> {
        self.paper_info.take(&paper.identifiers)
    }
    async fn paper_authors(&self, paper: &Paper) -> anyhow::Result<Vec<Author>> {
        self.paper_authors.take(&paper.identifiers)
    }
    async fn paper_venues(&self, paper: &Paper) -> anyhow::Result<Vec<Venue>> {
        self.paper_venues.take(&paper.identifiers)
    }
    async fn paper_references(&self, paper: &Paper) -> anyhow::Result<Vec<Paper>> {
        self.paper_references.take(&paper.identifiers)
    }
    async fn paper_citations(&self, paper: &Paper) -> anyhow::Result<Vec<Paper>> {
        self.paper_citations.take(&paper.identifiers)
    }
    async fn author_info(&self, author: &Author) -> anyhow::Result<(Author, Info)> {
        self.author_info.take(&author.identifiers)
    }
    async fn author_papers(&self, author: &Author) -> anyhow::Result<Vec<Paper>> {
        self.author_papers.take(&author.identifiers)
    }
    async fn venue_info(&self, venue: &Venue) -> anyhow::Result<(Venue, Info)> {
        self.venue_info.take(&venue.identifiers)
    }
    async fn venue_papers(&self, venue: &Venue) -> anyhow::Result<Vec<Paper>> {
        self.venue_papers.take(&venue.identifiers)
    }
}

/// Recording destination. Flip `fail_writes` to simulate an outage.
#[derive(Default)]
pub struct MockDestination {
    pub saves: Mutex<Vec<(Kind, BTreeSet<String>, Info)>>,
    pub links: Mutex<Vec<(Relation, BTreeSet<String>, BTreeSet<String>)>>,
    pub fail_writes: AtomicBool,
}

impl MockDestination {
    pub fn save_count(&self, kind: Kind, identifier: &str) -> usize {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, ids, _)| *k == kind && ids.contains(identifier))
            .count()
    }

    pub fn link_count(&self, relation: Relation, parent: &str, child: &str) -> usize {
        self.links
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, p, c)| *r == relation && p.contains(parent) && c.contains(child))
            .count()
    }

    pub fn total_links(&self) -> usize {
        self.links.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Destination for MockDestination {
    async fn save_info(
        &self,
        kind: Kind,
        identifiers: &BTreeSet<String>,
        info: &Info,
    ) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("destination unavailable");
        }
        self.saves
            .lock()
            .unwrap()
            .push((kind, identifiers.clone(), info.clone()));
        Ok(())
    }

    async fn link(
        &self,
        relation: Relation,
        parent: &BTreeSet<String>,
        child: &BTreeSet<String>,
    ) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("destination unavailable");
        }
        self.links
            .lock()
            .unwrap()
            .push((relation, parent.clone(), child.clone()));
        Ok(())
    }
}
