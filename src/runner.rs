//! The driver. Selects the execution mode, wires the agents, primes the
//! pipeline from the input file, performs the two-phase drain and runs the
//! single-threaded finalization: URL list, page structures, clustering,
//! report, session file and summary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::agents::{
    Agent, CommandCapturer, TcpPortScanner, UrlHostnameResolver, UrlPageTitleExtractor,
    UrlPublisher, UrlRequester, UrlScreenshotter, UrlTakeoverDetector,
    UrlTechnologyFingerprinter,
};
use crate::bus::Event;
use crate::config::Config;
use crate::error::ScanError;
use crate::report::{Report, DEFAULT_TEMPLATE};
use crate::session::{Session, SessionFile};
use crate::similarity::{cluster_pages, get_page_structure};
use crate::utils;
use crate::{REPORT_FILENAME, SESSION_FILENAME, URLS_FILENAME};

pub async fn run(options: Config) -> Result<(), ScanError> {
    if options.report_only() {
        return run_report_only(&options);
    }
    run_live(options).await
}

/// Regenerate the HTML report from a previously serialized session.
pub fn run_report_only(options: &Config) -> Result<(), ScanError> {
    let path = options.session_path.clone().ok_or_else(|| {
        ScanError::ConfigurationError("report-only mode requires a session path".to_string())
    })?;
    let session = SessionFile::load(&path)?;
    info!("Loaded session at {}", path.display());

    let template = load_template(options)?;
    let report = Report::new(&session, template);
    let out = options.out_dir.join(REPORT_FILENAME);
    std::fs::write(&out, report.render())?;
    info!("Wrote HTML report to: {}", out.display());
    Ok(())
}

pub async fn run_live(options: Config) -> Result<(), ScanError> {
    let session = Session::new(options)?;
    register_agents(&session)?;

    session.event_bus.publish(Event::SessionStart);
    prime_targets(&session)?;

    // A SIGINT takes the short path: stop waiting for the pipeline and
    // write out whatever has been gathered so far.
    tokio::select! {
        _ = drain(&session) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; writing partial session and report");
        }
    }

    finalize(&session).await
}

pub fn register_agents(session: &Arc<Session>) -> Result<(), ScanError> {
    let mut agents: Vec<Box<dyn Agent>> = vec![
        Box::new(TcpPortScanner::new()),
        Box::new(UrlPublisher::new()),
        Box::new(UrlRequester::new()),
        Box::new(UrlHostnameResolver::new()),
        Box::new(UrlPageTitleExtractor::new()),
    ];
    if !session.options.out_dir_disabled() {
        agents.push(Box::new(UrlScreenshotter::new(Arc::new(
            CommandCapturer::default(),
        ))));
        agents.push(Box::new(UrlTechnologyFingerprinter::default()));
    }
    agents.push(Box::new(UrlTakeoverDetector::new()));

    for agent in &agents {
        agent.register(session)?;
        debug!("Registered {}", agent.id());
    }
    Ok(())
}

/// Stream the input file, classify each line and publish the matching
/// events: hosts go out once, supported URLs twice (first-hop and
/// redirect-following), anything else is dropped.
pub fn prime_targets(session: &Arc<Session>) -> Result<(), ScanError> {
    let path = session.options.input.clone().ok_or_else(|| {
        ScanError::ConfigurationError("an input file is required for a live run".to_string())
    })?;
    let content = std::fs::read_to_string(&path).map_err(|source| ScanError::InputUnreadable {
        path: path.display().to_string(),
        source,
    })?;

    for line in content.lines() {
        let target = line.trim();
        if target.is_empty() {
            continue;
        }
        if utils::is_url(target) {
            if utils::has_supported_scheme(target) {
                session
                    .event_bus
                    .publish(Event::Url(target.to_string(), false));
                session
                    .event_bus
                    .publish(Event::Url(target.to_string(), true));
            } else {
                debug!("Dropping target with unsupported scheme: {target}");
            }
        } else {
            session.event_bus.publish(Event::Host(target.to_string()));
        }
    }
    Ok(())
}

/// Two-phase quiescence. Phase one settles the grace period, drains the bus
/// and both wait groups so every cascade has run dry; phase two publishes
/// `SessionEnd` and drains whatever the finalizers enqueued.
pub async fn drain(session: &Arc<Session>) {
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.event_bus.wait_async().await;
    session.wait_group.wait().await;
    session.wait_group2.wait().await;

    session.event_bus.publish(Event::SessionEnd);

    tokio::time::sleep(Duration::from_secs(1)).await;
    session.event_bus.wait_async().await;
    session.wait_group.wait().await;
}

pub async fn finalize(session: &Arc<Session>) -> Result<(), ScanError> {
    if !session.options.out_dir_disabled() {
        write_url_list(session);
        compute_page_structures(session);

        info!("Clustering similar pages...");
        let inputs: Vec<(String, Vec<String>)> = session
            .pages_in_order()
            .iter()
            .map(|handle| {
                let page = handle.lock().expect("page lock poisoned");
                (page.url.clone(), page.page_structure.clone())
            })
            .collect();
        session.set_clusters(cluster_pages(
            &inputs,
            session.options.clustering_predicate,
        ));

        let template = load_template(&session.options)?;
        let snapshot = session.to_file();
        let report = Report::new(&snapshot, template);
        let out = session.get_file_path(REPORT_FILENAME);
        std::fs::write(&out, report.render())?;
        info!("Wrote HTML report to: {}", out.display());
    }

    session.end();

    if !session.options.out_dir_disabled() {
        info!("Writing session file...");
        if let Err(err) = session.save(SESSION_FILENAME) {
            error!("Failed to write session file: {err}");
        }
    }

    print_summary(session);
    Ok(())
}

fn write_url_list(session: &Arc<Session>) {
    let path = session.get_file_path(URLS_FILENAME);
    let mut content = String::new();
    for handle in session.pages_in_order() {
        content.push_str(&handle.lock().expect("page lock poisoned").url);
        content.push('\n');
    }
    if let Err(err) = std::fs::write(&path, content) {
        error!("Failed to write {}: {err}", path.display());
    }
}

/// Load every saved body back from `html/` and turn it into the page's
/// structural fingerprint. Pages without a saved body keep an empty
/// structure.
fn compute_page_structures(session: &Arc<Session>) {
    info!("Calculating page structures...");
    for handle in session.pages_in_order() {
        let body_path = {
            let page = handle.lock().expect("page lock poisoned");
            page.body_path.clone()
        };
        if body_path.is_empty() {
            continue;
        }
        match std::fs::read_to_string(session.get_file_path(&body_path)) {
            Ok(body) => {
                handle.lock().expect("page lock poisoned").page_structure =
                    get_page_structure(&body);
            }
            Err(err) => {
                debug!("Skipping structure for {body_path}: {err}");
            }
        }
    }
}

fn load_template(options: &Config) -> Result<String, ScanError> {
    match &options.template_path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| ScanError::TemplateUnreadable(format!("{}: {err}", path.display()))),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

fn print_summary(session: &Arc<Session>) {
    let stats = session.stats.snapshot();

    println!();
    println!("Time:");
    println!(" - Started at  : {}", stats.started_at.to_rfc3339());
    println!(" - Finished at : {}", stats.finished_at.to_rfc3339());
    println!(
        " - Duration    : {}",
        utils::format_duration(stats.duration())
    );
    println!();
    println!("Requests:");
    println!(" - Successful : {}", stats.request_successful);
    println!(" - Failed     : {}", stats.request_failed);
    println!();
    println!(" - 2xx : {}", stats.response_code_2xx);
    println!(" - 3xx : {}", stats.response_code_3xx);
    println!(" - 4xx : {}", stats.response_code_4xx);
    println!(" - 5xx : {}", stats.response_code_5xx);
    println!();
    println!("Screenshots:");
    println!(" - Successful : {}", stats.screenshot_successful);
    println!(" - Failed     : {}", stats.screenshot_failed);
    println!();
}
