//! Translation of a release into the scheduler's desired state.

use keel_core::{App, Process};
use keel_state::{AppRecord, Config, Release, Slug};

/// The app the scheduler should converge on for `release`.
///
/// Config vars become app env, and every process type in the slug with a
/// nonzero instance count becomes a process running the slug's image.
/// Types scaled to zero are left out, so the scheduler removes their
/// services; the release's formation still records them.
pub fn release_app(app: &AppRecord, config: &Config, release: &Release, slug: &Slug) -> App {
    let processes = slug
        .process_types
        .iter()
        .filter_map(|(process_type, command)| {
            let instances = release.formation.get(process_type).copied().unwrap_or(0);
            (instances > 0).then(|| {
                Process::new(process_type, command.clone(), instances, slug.image.clone())
            })
        })
        .collect();

    App {
        id: app.id.clone(),
        name: app.name.clone(),
        env: config.vars.clone(),
        labels: Default::default(),
        processes,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use keel_core::Image;
    use keel_scheduler::{MemoryCluster, Scheduler};
    use keel_state::{Formation, ProcessTypes};

    use super::*;

    fn app() -> AppRecord {
        AppRecord {
            id: "app-1".to_string(),
            name: "acme-inc".to_string(),
            repo: "remind101/acme-inc".to_string(),
            created_at: 0,
        }
    }

    fn config() -> Config {
        Config {
            id: "cfg-1".to_string(),
            app_id: "app-1".to_string(),
            version: 2,
            vars: BTreeMap::from([("RAILS_ENV".to_string(), "production".to_string())]),
            created_at: 0,
        }
    }

    fn slug() -> Slug {
        Slug {
            id: "slug-1".to_string(),
            image: Image::parse("remind101/acme-inc:v2").unwrap(),
            process_types: ProcessTypes::from([
                ("web".to_string(), vec!["./bin/web".to_string()]),
                ("worker".to_string(), vec!["./bin/worker".to_string()]),
            ]),
            created_at: 0,
        }
    }

    fn release(version: u32, formation: &[(&str, u32)]) -> Release {
        Release {
            id: format!("rel-{version}"),
            app_id: "app-1".to_string(),
            version,
            config_id: "cfg-1".to_string(),
            slug_id: "slug-1".to_string(),
            formation: formation
                .iter()
                .map(|(t, n)| (t.to_string(), *n))
                .collect::<Formation>(),
            description: String::new(),
            created_at: 0,
        }
    }

    #[test]
    fn release_becomes_desired_app() {
        let slug = slug();
        let release = release(3, &[("web", 2), ("worker", 0)]);

        let desired = release_app(&app(), &config(), &release, &slug);

        assert_eq!(desired.id, "app-1");
        assert_eq!(desired.env["RAILS_ENV"], "production");
        assert_eq!(desired.processes.len(), 1);
        let web = desired.process("web").unwrap();
        assert_eq!(web.instances, 2);
        assert_eq!(web.image, slug.image);
        assert!(desired.process("worker").is_none());
        assert_eq!(release.formation["worker"], 0);
    }

    #[tokio::test]
    async fn scaling_to_zero_removes_the_service() {
        let cluster = Arc::new(MemoryCluster::new());
        let scheduler = Scheduler::new(cluster.clone());
        let (app, config, slug) = (app(), config(), slug());

        let running = release(1, &[("web", 1), ("worker", 2)]);
        scheduler
            .submit(&release_app(&app, &config, &running, &slug))
            .await
            .unwrap();
        assert!(cluster.service_by_name("app-1_worker").await.is_some());

        let scaled_down = release(2, &[("web", 1), ("worker", 0)]);
        scheduler
            .submit(&release_app(&app, &config, &scaled_down, &slug))
            .await
            .unwrap();

        assert!(cluster.service_by_name("app-1_worker").await.is_none());
        assert!(cluster.service_by_name("app-1_web").await.is_some());
    }
}
