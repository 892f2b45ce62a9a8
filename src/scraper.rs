use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::extract;
use crate::fetch;

const MAX_WORKERS: usize = 5;
const PACE_MIN_SECS: f64 = 0.5;
const PACE_MAX_SECS: f64 = 2.5;
const GROUP_PAUSE_MIN_SECS: f64 = 1.0;
const GROUP_PAUSE_MAX_SECS: f64 = 2.0;
const MIN_AGE: u8 = 10;
const MAX_AGE: u8 = 19;

pub const OUTPUT_DIR: &str = "data/scraped";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "m",
            Gender::Female => "f",
        }
    }

    pub fn parse(s: &str) -> Option<Gender> {
        match s {
            "m" | "male" => Some(Gender::Male),
            "f" | "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// One independently-paginated query stream: a (gender, age band) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub gender: Gender,
    pub age: u8,
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_u{}", self.gender.code(), self.age)
    }
}

impl Group {
    fn base_query(&self, base: &str) -> String {
        format!(
            "{}?search[team_country]=USA\
             &search[gender]={}\
             &search[age]={}\
             &search[team_or_club_name]=\
             &search[team_association]=CAS\
             &search[filter_by]=state",
            base,
            self.gender.code(),
            self.age
        )
    }

    fn page_url(&self, base: &str, page: u64) -> String {
        format!("{}&search[page]={}", self.base_query(base), page)
    }
}

/// Enumerate the groups for a run, optionally narrowed by CLI filters.
pub fn groups(gender: Option<Gender>, age: Option<u8>) -> Vec<Group> {
    let genders = match gender {
        Some(g) => vec![g],
        None => vec![Gender::Male, Gender::Female],
    };
    let ages: Vec<u8> = match age {
        Some(a) => vec![a],
        None => (MIN_AGE..=MAX_AGE).collect(),
    };
    genders
        .iter()
        .flat_map(|&g| ages.iter().map(move |&a| Group { gender: g, age: a }))
        .collect()
}

pub struct GroupStats {
    pub total_pages: u64,
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub teams: usize,
}

struct PageFetch {
    page: u64,
    payload: Option<Value>,
}

/// Collect every page of one group. Returns `None` when the initial page
/// could not be fetched and the group was abandoned.
pub async fn scrape_group(
    client: &Client,
    base: &str,
    group: Group,
    out_dir: &Path,
) -> Result<Option<GroupStats>> {
    info!("==========================================");
    info!("Starting scrape for {}", group);

    let date = Local::now().format("%Y%m%d").to_string();

    // Total page count is only known from a successful first response.
    let Some(first_page) = fetch::fetch_json(client, &group.page_url(base, 1)).await else {
        warn!("Failed to fetch initial page for {}, abandoning group", group);
        return Ok(None);
    };
    save_json(&first_page, out_dir, &format!("{}_page1_raw_{}.json", group, date));

    let total_pages = first_page
        .pointer("/pagination/total_pages")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    info!("Found {} pages", total_pages);

    let mut all_teams = extract::extract_records(&first_page);
    info!("Found {} teams from page 1", all_teams.len());

    let mut pages_ok = 1usize;
    let mut pages_failed = 0usize;

    if total_pages > 1 {
        let pb = ProgressBar::new(total_pages - 1);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let semaphore = Arc::new(Semaphore::new(MAX_WORKERS));
        let (tx, mut rx) = tokio::sync::mpsc::channel::<PageFetch>(MAX_WORKERS * 2);

        for page in 2..=total_pages {
            let client = client.clone();
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();
            let url = group.page_url(base, page);

            tokio::spawn(async move {
                let _permit = sem.acquire().await.unwrap();
                let payload = fetch::fetch_json(&client, &url).await;
                let _ = tx.send(PageFetch { page, payload }).await;
                // Pace this worker slot; the permit is held through the pause
                // so the rest of the pool keeps moving.
                let pause = rand::rng().random_range(PACE_MIN_SECS..=PACE_MAX_SECS);
                tokio::time::sleep(Duration::from_secs_f64(pause)).await;
            });
        }
        drop(tx);

        // Results arrive in completion order; the dump index below is the
        // arrival sequence, not the page number.
        let mut seq = 1u64;
        while let Some(fetched) = rx.recv().await {
            seq += 1;
            match fetched.payload {
                Some(payload) => {
                    save_json(
                        &payload,
                        out_dir,
                        &format!("{}_page{}_raw_{}.json", group, seq, date),
                    );
                    let teams = extract::extract_records(&payload);
                    info!("Found {} teams from page {}", teams.len(), fetched.page);
                    all_teams.extend(teams);
                    pages_ok += 1;
                }
                None => {
                    warn!("Skipping page {} for {}", fetched.page, group);
                    pages_failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    let teams = all_teams.len();
    if teams == 0 {
        warn!("No teams found for {}", group);
    } else {
        info!("Collected {} total teams for {}", teams, group);
        save_json(
            &Value::Array(all_teams),
            out_dir,
            &format!("{}_team_data_{}.json", group, date),
        );
    }

    info!("Scrape for {} completed", group);
    Ok(Some(GroupStats {
        total_pages,
        pages_ok,
        pages_failed,
        teams,
    }))
}

/// Run the whole collection: sentinel markers, then every group strictly in
/// sequence with a short pause between groups.
pub async fn scrape_all(client: &Client, groups: &[Group], out_dir: &Path) -> Result<()> {
    let base = std::env::var("RANKINGS_API_BASE")
        .map_err(|_| anyhow!("RANKINGS_API_BASE environment variable must be set"))?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    write_sentinel(out_dir, "scraper_started.txt", "started")?;

    for (i, group) in groups.iter().enumerate() {
        match scrape_group(client, &base, *group, out_dir).await? {
            Some(stats) => info!(
                "{}: {} teams across {} pages ({} ok, {} failed)",
                group, stats.teams, stats.total_pages, stats.pages_ok, stats.pages_failed
            ),
            None => warn!("{}: abandoned", group),
        }
        if i + 1 < groups.len() {
            let pause = rand::rng().random_range(GROUP_PAUSE_MIN_SECS..=GROUP_PAUSE_MAX_SECS);
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }
    }

    write_sentinel(out_dir, "scraper_completed.txt", "completed")
}

fn write_sentinel(dir: &Path, name: &str, what: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, format!("Scraper {} at {}\n", what, Local::now()))
        .with_context(|| format!("writing {}", path.display()))
}

fn save_json(data: &Value, dir: &Path, filename: &str) {
    let path = dir.join(filename);
    let result = serde_json::to_string_pretty(data)
        .map_err(anyhow::Error::from)
        .and_then(|body| std::fs::write(&path, body).map_err(anyhow::Error::from));
    match result {
        Ok(()) => info!("Data saved to {}", path.display()),
        Err(e) => warn!("ERROR saving {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_display() {
        let group = Group {
            gender: Gender::Male,
            age: 12,
        };
        assert_eq!(group.to_string(), "m_u12");
        let group = Group {
            gender: Gender::Female,
            age: 19,
        };
        assert_eq!(group.to_string(), "f_u19");
    }

    #[test]
    fn page_url_carries_group_dimensions_and_page() {
        let group = Group {
            gender: Gender::Female,
            age: 14,
        };
        let url = group.page_url("https://api.example.test/rankings", 3);
        assert!(url.starts_with("https://api.example.test/rankings?"));
        assert!(url.contains("search[team_country]=USA"));
        assert!(url.contains("search[gender]=f"));
        assert!(url.contains("search[age]=14"));
        assert!(url.contains("search[team_association]=CAS"));
        assert!(url.contains("search[filter_by]=state"));
        assert!(url.ends_with("&search[page]=3"));
    }

    #[test]
    fn group_enumeration_and_filters() {
        assert_eq!(groups(None, None).len(), 20);
        let boys = groups(Some(Gender::Male), None);
        assert_eq!(boys.len(), 10);
        assert!(boys.iter().all(|g| g.gender == Gender::Male));
        assert_eq!(
            groups(Some(Gender::Female), Some(15)),
            vec![Group {
                gender: Gender::Female,
                age: 15
            }]
        );
    }

    #[test]
    fn gender_parsing() {
        assert_eq!(Gender::parse("m"), Some(Gender::Male));
        assert_eq!(Gender::parse("female"), Some(Gender::Female));
        assert_eq!(Gender::parse("x"), None);
    }
}
