use super::backend::{CompanyProfile, Contact, ResearchBackend, SalaryRow};
use crate::cache::{CacheRun, CacheSettings, CacheStep, StepCache};
use crate::errors::Error;
use crate::utils::format_elapsed;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The research and reply stages, memoized through the step cache
pub struct Pipeline {
    backend: Arc<dyn ResearchBackend>,
    cache: StepCache,
    settings: CacheSettings,
    model: String,
    max_referrals: usize,
}

impl Pipeline {
    /// Creates a pipeline
    ///
    /// # Arguments
    ///
    /// * `backend` - External collaborators
    /// * `cache` - Step cache shared by every run
    /// * `settings` - Cache policy applied to each run
    /// * `model` - Model name passed to the research collaborator
    /// * `max_referrals` - Number of contacts kept as possible referrals
    pub fn new(
        backend: Arc<dyn ResearchBackend>,
        cache: StepCache,
        settings: CacheSettings,
        model: impl Into<String>,
        max_referrals: usize,
    ) -> Self {
        Self {
            backend,
            cache,
            settings,
            model: model.into(),
            max_referrals,
        }
    }

    /// Starts a cache run; one per task
    pub fn begin_run(&self) -> Result<CacheRun, Error> {
        self.cache.begin_run(self.settings.clone())
    }

    /// Full company research: initial research, then follow-up when the
    /// company looks like a good fit
    pub async fn research_company(&self, run: &CacheRun, content: &str) -> Result<CompanyProfile, Error> {
        let profile = run
            .wrap_stage(CacheStep::BasicResearch, "initial_research_company")
            .call(
                (content.to_string(), self.model.clone()),
                |(content, model)| async move { self.initial_research(&content, &model).await },
            )
            .await?;
        debug!("Company info after initial research: {:?}", profile);

        if !self.is_good_fit(&profile) {
            return Ok(profile);
        }

        let profile = run
            .wrap_stage(CacheStep::FollowupResearch, "followup_research_company")
            .call(profile, |profile| async move {
                self.followup_research(profile).await
            })
            .await?;
        debug!("Company info after followup research: {:?}", profile);
        Ok(profile)
    }

    /// Drafts a reply to a recruiter message
    pub async fn generate_reply(&self, run: &CacheRun, message: &str) -> Result<String, Error> {
        run.wrap_stage(CacheStep::Reply, "generate_reply")
            .call(message.to_string(), |message| async move {
                self.backend.generate_reply(&message).await
            })
            .await
    }

    async fn initial_research(&self, content: &str, model: &str) -> Result<CompanyProfile, Error> {
        info!("Starting initial research...");
        let mut profile = self.backend.research_company(content, model).await?;

        info!("Finding equivalent job levels ...");
        let started = Instant::now();
        let levels = self.backend.extract_levels(&profile.name).await?;
        if levels.is_empty() {
            info!("No equivalent job levels found for {}", profile.name);
        } else {
            profile.level_equiv = Some(levels.join(", "));
            info!(
                "Found equivalent job levels: {} in {}",
                levels.join(", "),
                format_elapsed(started.elapsed())
            );
        }

        info!("Finding salary data ...");
        let started = Instant::now();
        let rows = self.backend.salary_data(&profile.name).await?;
        info!(
            "Got {} rows of salary data for {} in {}",
            rows.len(),
            profile.name,
            format_elapsed(started.elapsed())
        );
        if rows.is_empty() {
            warn!("No salary data found for {}", profile.name);
        } else {
            apply_salary_averages(&mut profile, &rows);
        }

        Ok(profile)
    }

    async fn followup_research(&self, mut profile: CompanyProfile) -> Result<CompanyProfile, Error> {
        info!("Starting followup research...");
        let contacts = self.backend.linkedin_contacts(&profile.name).await?;
        profile.maybe_referrals = Some(render_referrals(&contacts, self.max_referrals));
        Ok(profile)
    }

    /// Every researched company currently qualifies for follow-up
    fn is_good_fit(&self, _profile: &CompanyProfile) -> bool {
        true
    }
}

/// Integer mean of the present values; `None` when there are none
fn average(values: impl Iterator<Item = f64>) -> Option<i64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| (sum / count as f64) as i64)
}

/// Fills compensation averages from salary rows
///
/// `total_comp` averages every reported value; base, equity and bonus skip
/// zero entries.
fn apply_salary_averages(profile: &mut CompanyProfile, rows: &[SalaryRow]) {
    let nonzero = |v: &f64| *v != 0.0;
    profile.total_comp = average(rows.iter().filter_map(|r| r.total_comp));
    profile.base = average(rows.iter().filter_map(|r| r.salary).filter(nonzero));
    profile.rsu = average(rows.iter().filter_map(|r| r.equity).filter(nonzero));
    profile.bonus = average(rows.iter().filter_map(|r| r.bonus).filter(nonzero));
}

/// One `name - title` line per contact, at most `max` lines
fn render_referrals(contacts: &[Contact], max: usize) -> String {
    contacts
        .iter()
        .take(max)
        .map(|c| format!("{} - {}", c.name, c.title))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory collaborators counting their calls
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub research_calls: AtomicUsize,
        pub linkedin_calls: AtomicUsize,
        pub reply_calls: AtomicUsize,
        pub fail_levels: bool,
    }

    #[async_trait]
    impl ResearchBackend for FakeBackend {
        async fn research_company(&self, content: &str, _model: &str) -> Result<CompanyProfile, Error> {
            self.research_calls.fetch_add(1, Ordering::SeqCst);
            let name = content.split_whitespace().next().unwrap_or_default();
            let mut extra = serde_json::Map::new();
            extra.insert("type".to_string(), json!("startup"));
            Ok(CompanyProfile {
                name: name.to_string(),
                extra,
                ..Default::default()
            })
        }

        async fn extract_levels(&self, _company: &str) -> Result<Vec<String>, Error> {
            if self.fail_levels {
                return Err(Error::Timeout {
                    function: "levels".to_string(),
                    elapsed: std::time::Duration::from_secs(120),
                });
            }
            Ok(vec!["L5".to_string(), "Senior Engineer".to_string()])
        }

        async fn salary_data(&self, _company: &str) -> Result<Vec<SalaryRow>, Error> {
            Ok(vec![
                SalaryRow {
                    total_comp: Some(300_000.0),
                    salary: Some(200_000.0),
                    equity: Some(0.0),
                    bonus: None,
                },
                SalaryRow {
                    total_comp: Some(251_000.0),
                    salary: Some(190_000.0),
                    equity: Some(50_000.0),
                    bonus: Some(11_000.0),
                },
            ])
        }

        async fn linkedin_contacts(&self, _company: &str) -> Result<Vec<Contact>, Error> {
            self.linkedin_calls.fetch_add(1, Ordering::SeqCst);
            Ok((1..=6)
                .map(|i| Contact {
                    name: format!("Person {}", i),
                    title: "Engineer".to_string(),
                })
                .collect())
        }

        async fn generate_reply(&self, message: &str) -> Result<String, Error> {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Thanks for reaching out about: {}", message))
        }
    }

    pub(crate) fn pipeline(
        backend: Arc<FakeBackend>,
        settings: CacheSettings,
    ) -> (tempfile::TempDir, Pipeline) {
        let dir = tempfile::tempdir().unwrap();
        let cache = StepCache::open(dir.path().join("steps.db").to_str().unwrap()).unwrap();
        let pipeline = Pipeline::new(backend, cache, settings, "claude-3-5-sonnet-latest", 4);
        (dir, pipeline)
    }

    #[tokio::test]
    async fn research_fills_levels_salary_and_referrals() {
        let backend = Arc::new(FakeBackend::default());
        let (_dir, pipeline) = pipeline(backend.clone(), CacheSettings::default());
        let run = pipeline.begin_run().unwrap();

        let profile = pipeline.research_company(&run, "Acme").await.unwrap();
        assert_eq!(profile.name, "Acme");
        assert_eq!(profile.level_equiv.as_deref(), Some("L5, Senior Engineer"));
        assert_eq!(profile.total_comp, Some(275_500));
        assert_eq!(profile.base, Some(195_000));
        assert_eq!(profile.rsu, Some(50_000));
        assert_eq!(profile.bonus, Some(11_000));
        assert_eq!(
            profile.maybe_referrals.as_deref(),
            Some("Person 1 - Engineer\nPerson 2 - Engineer\nPerson 3 - Engineer\nPerson 4 - Engineer")
        );

        let details = serde_json::to_value(&profile).unwrap();
        assert_eq!(details["type"], json!("startup"));
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let backend = Arc::new(FakeBackend::default());
        let (_dir, pipeline) = pipeline(backend.clone(), CacheSettings::default());

        let first = pipeline
            .research_company(&pipeline.begin_run().unwrap(), "Acme")
            .await
            .unwrap();
        let second = pipeline
            .research_company(&pipeline.begin_run().unwrap(), "Acme")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.research_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.linkedin_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ceiling_recomputes_later_stages() {
        let backend = Arc::new(FakeBackend::default());
        let settings = CacheSettings {
            cache_until: Some(CacheStep::BasicResearch),
            ..Default::default()
        };
        let (_dir, pipeline) = pipeline(backend.clone(), settings);

        for _ in 0..2 {
            let run = pipeline.begin_run().unwrap();
            pipeline.research_company(&run, "Acme").await.unwrap();
        }

        assert_eq!(backend.research_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.linkedin_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stage_failure_propagates_and_is_not_cached() {
        let backend = Arc::new(FakeBackend {
            fail_levels: true,
            ..Default::default()
        });
        let (_dir, pipeline) = pipeline(backend.clone(), CacheSettings::default());
        let run = pipeline.begin_run().unwrap();

        let err = pipeline.research_company(&run, "Acme").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(run.cache().is_empty().unwrap());
    }

    #[test]
    fn averages_skip_missing_values() {
        assert_eq!(average(std::iter::empty()), None);
        assert_eq!(average([1.0, 2.0].into_iter()), Some(1));
        assert_eq!(render_referrals(&[], 4), "");
    }
}
