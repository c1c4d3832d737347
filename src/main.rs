use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use image::Rgb;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use emotune::annotate::{AnnotationStyle, SharedStyle};
use emotune::camera::{self, CameraSource};
use emotune::config::{AppConfig, LoggingConfig};
use emotune::font;
use emotune::history::{EmotionStats, HistoryLog, SessionContext};
use emotune::output::WindowOutput;
use emotune::prefs::PreferenceStore;
use emotune::query::{Missing, MusicQuery, Platform};
use emotune::ttf::FontRenderer;
use emotune::worker::{PipelineWorker, Submit, WorkerEvent};
use emotune::{EmotionPipeline, EmotionState, Pipeline};

mod args;

use args::Args;

/// Consecutive failed captures before the camera is treated as gone.
const MAX_CAPTURE_FAILURES: usize = 30;

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Config loading logs through a temporary subscriber until the configured one is installed.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(LoggingConfig::default().filter))
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || AppConfig::load_from(&args.config))?;
    init_logging(&config.logging);

    if args.list {
        return list_cameras();
    }

    let state = EmotionState::file(&config.storage.state_path);
    let prefs = PreferenceStore::new(&config.storage.preferences_path).resolve(
        &args.username,
        args.language.as_deref(),
        args.artist.as_deref(),
    );
    let session = SessionContext {
        username: args.username.clone(),
        language: prefs.language,
        artist: prefs.artist,
    };

    if args.reset {
        state.reset()?;
        println!("{}", "Current emotion cleared.".green());
        return Ok(());
    }
    if args.status {
        return print_status(&config, &state, &session);
    }
    if let Some(path) = &args.export_csv {
        let count = HistoryLog::new(&config.storage.history_path).export_csv(&session.username, path)?;
        println!("Exported {} events for {} to {}", count, session.username, path);
        return Ok(());
    }
    if args.recommend {
        return recommend(&state, &session);
    }

    let pipeline = match EmotionPipeline::from_config(&config, state.clone(), session) {
        Ok(p) => p.with_annotation(!args.headless),
        Err(e) => {
            error!(error = %e, "emotion detection unavailable");
            println!("{} {}", "Emotion detection unavailable:".red(), e);
            return Ok(());
        }
    };
    println!("Active Pipeline: {}", pipeline.name());

    let mut camera = match CameraSource::new(args.cam_index as usize) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %format!("{e:#}"), "camera unavailable");
            println!("{} {:#}", "Camera unavailable:".red(), e);
            return Ok(());
        }
    };
    println!("Opened camera: {}", camera.name());

    let style = pipeline.annotation_style();
    let worker = PipelineWorker::spawn(pipeline)?;
    if args.headless {
        run_headless(&mut camera, &worker, args.frames)?;
    } else {
        run_window(&config, &mut camera, &worker, &state, &style)?;
    }
    worker.shutdown();

    match state.current() {
        Some(label) => println!("Last detected emotion: {}", label.to_string().bold()),
        None => println!("No emotion detected."),
    }
    Ok(())
}

fn list_cameras() -> Result<()> {
    let cameras = camera::list_cameras()?;
    println!("Available Cameras:");
    println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
    println!("{}", "-".repeat(60));
    for cam in cameras {
        println!("{:<5} | {:<30} | {:?}", cam.index(), cam.human_name(), cam.misc());
    }
    Ok(())
}

fn print_status(config: &AppConfig, state: &EmotionState, session: &SessionContext) -> Result<()> {
    match state.current() {
        Some(label) => println!("Current emotion: {}", label.to_string().bold().green()),
        None => println!("Current emotion: {}", "none".dimmed()),
    }

    let log = HistoryLog::new(&config.storage.history_path);
    let events = log.for_user(&session.username)?;
    let stats = EmotionStats::from_events(&events);
    println!(
        "\nHistory for {} ({}): {} detections, {} distinct emotions",
        session.username,
        log.path().display(),
        stats.total,
        stats.unique_emotions()
    );
    for (label, count) in &stats.by_emotion {
        println!("  {:<12} {}", label.as_str(), count);
    }
    if let Some(label) = stats.dominant() {
        println!("Dominant emotion: {}", label.to_string().bold());
    }
    if let Some(day) = stats.busiest_weekday() {
        println!("Most active day: {day}");
    }
    if !session.language.is_empty() || !session.artist.is_empty() {
        println!("Saved preferences: language {:?}, artist {:?}", session.language, session.artist);
    }
    if let Some(lang) = &stats.top_language {
        println!("Favorite language: {lang}");
    }
    if let Some(artist) = &stats.top_artist {
        println!("Favorite artist: {artist}");
    }
    if let Some(last) = &stats.last {
        println!("Last detection: {} at {}", last.emotion, last.timestamp.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

/// Consume the current emotion and print search links for it. The emotion is only cleared
/// once language and artist are known too.
fn recommend(state: &EmotionState, session: &SessionContext) -> Result<()> {
    let mut missing = MusicQuery::missing(state.current().as_ref(), &session.language, &session.artist);
    if missing.is_empty() {
        match MusicQuery::new(state.take()?, &session.language, &session.artist) {
            Ok(query) => {
                print_links(&query);
                return Ok(());
            }
            // Another reader consumed it first.
            Err(m) => missing = m,
        }
    }
    for m in missing {
        println!("{} {}", "Missing:".yellow(), m);
        if m != Missing::Emotion {
            println!("  pass --{m} once; it is remembered for {}", session.username);
        }
    }
    Ok(())
}

fn print_links(query: &MusicQuery) {
    println!("Songs for a {} mood:", query.emotion.to_string().bold());
    println!("  {:<13} {}", "Best match", query.best_match_url().cyan());
    for (platform, url) in query.links() {
        let name = if Platform::PRIMARY.contains(&platform) {
            platform.name().bold()
        } else {
            platform.name().normal()
        };
        println!("  {:<13} {}", name, url);
    }
}

fn run_headless(camera: &mut CameraSource, worker: &PipelineWorker, frames: Option<usize>) -> Result<()> {
    let mut processed = 0usize;
    let mut failures = 0usize;
    while frames.map_or(true, |n| processed < n) {
        let frame = match camera.capture() {
            Ok(f) => f,
            Err(e) => {
                failures += 1;
                warn!(error = %format!("{e:#}"), failures, "capture failed");
                if failures >= MAX_CAPTURE_FAILURES {
                    println!("{} {:#}", "Camera unavailable:".red(), e);
                    break;
                }
                continue;
            }
        };
        failures = 0;
        match worker.submit(frame) {
            Submit::Accepted => {}
            Submit::Busy => continue,
            Submit::Closed => {
                println!("{}", "Emotion detection stopped.".red());
                break;
            }
        }
        match worker.recv() {
            Some(WorkerEvent::Frame(analysis)) => {
                processed += 1;
                if let Some(c) = &analysis.emotion {
                    println!("{:>6} {} ({:.2})", processed, c.label, c.score);
                }
            }
            Some(WorkerEvent::Failed(_)) => processed += 1,
            Some(WorkerEvent::Stopped(reason)) => {
                println!("{} {}", "Emotion detection unavailable:".red(), reason);
                break;
            }
            None => break,
        }
    }
    info!(processed, "headless run finished");
    Ok(())
}

fn run_window(
    config: &AppConfig,
    camera: &mut CameraSource,
    worker: &PipelineWorker,
    state: &EmotionState,
    style: &SharedStyle,
) -> Result<()> {
    let mut window = WindowOutput::new("Emotune", camera.width() as usize, camera.height() as usize)?;
    let menu_font = FontRenderer::try_load(&config.ui.font_family);

    println!("Controls: [1] Face Mesh [2] Hands [3] Label [R] Reset emotion [Esc] Quit");

    let mut unavailable: Option<String> = None;
    let mut failures = 0usize;

    while window.is_open() && !window.is_key_down(minifb::Key::Escape) {
        for key in window.keys_pressed() {
            let mut s = style.write();
            match key {
                minifb::Key::Key1 => s.show_mesh = !s.show_mesh,
                minifb::Key::Key2 => s.show_hands = !s.show_hands,
                minifb::Key::Key3 => s.show_label = !s.show_label,
                minifb::Key::R => {
                    if let Err(e) = state.reset() {
                        warn!(error = %e, "failed to clear current emotion");
                    }
                }
                _ => {}
            }
        }

        let frame = match camera.capture() {
            Ok(f) => {
                failures = 0;
                f
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_CAPTURE_FAILURES {
                    error!(error = %format!("{e:#}"), "camera stopped delivering frames");
                    println!("{} {:#}", "Camera unavailable:".red(), e);
                    break;
                }
                window.pump();
                continue;
            }
        };

        let mut raw = None;
        if unavailable.is_some() {
            raw = Some(frame);
        } else if worker.submit(frame) == Submit::Closed {
            unavailable = Some("pipeline worker exited".to_string());
        }

        let mut shown = None;
        while let Some(event) = worker.try_next() {
            match event {
                WorkerEvent::Frame(analysis) => shown = Some(analysis.annotated),
                WorkerEvent::Failed(_) => {}
                WorkerEvent::Stopped(reason) => {
                    warn!(%reason, "emotion detection stopped");
                    unavailable = Some(reason);
                }
            }
        }

        // The newest annotated result while the worker runs, the raw mirror after it stops.
        let mut display = if let Some(frame) = raw {
            let mut mirrored = image::imageops::flip_horizontal(&frame);
            draw_status(&mut mirrored, config, menu_font.as_ref(), "Emotion unavailable", Rgb([255, 64, 64]));
            mirrored
        } else if let Some(annotated) = shown {
            annotated
        } else {
            window.pump();
            continue;
        };
        draw_menu(&mut display, config, menu_font.as_ref(), &style.read());
        window.show(&display)?;
    }
    Ok(())
}
fn line_height(config: &AppConfig, font: Option<&FontRenderer>) -> u32 {
    match font {
        Some(fr) => fr.measure_height(config.ui.font_size_pt as f32) + 5,
        None => 12 * config.ui.menu_scale as u32,
    }
}

fn draw_text(frame: &mut emotune::Frame, config: &AppConfig, font: Option<&FontRenderer>, y: u32, text: &str, color: Rgb<u8>) {
    match font {
        Some(fr) => fr.draw_text(frame, 10, y, text, color, config.ui.font_size_pt as f32),
        None => font::draw_text_line(frame, 10, y, text, color, config.ui.menu_scale as u32),
    }
}

fn draw_menu(frame: &mut emotune::Frame, config: &AppConfig, font: Option<&FontRenderer>, style: &AnnotationStyle) {
    let items = [
        ("1", "Face Mesh", style.show_mesh),
        ("2", "Hands", style.show_hands),
        ("3", "Label", style.show_label),
    ];
    let step = line_height(config, font);
    let mut y = (frame.height() / 2).saturating_sub(step * items.len() as u32);
    for (key, label, active) in items {
        let color = if active { Rgb([0, 255, 0]) } else { Rgb([255, 255, 255]) };
        let text = format!("[{}] {} [{}]", key, label, if active { "ON" } else { "OFF" });
        draw_text(frame, config, font, y, &text, color);
        y += step;
    }
}

fn draw_status(frame: &mut emotune::Frame, config: &AppConfig, font: Option<&FontRenderer>, text: &str, color: Rgb<u8>) {
    let y = frame.height().saturating_sub(2 * line_height(config, font));
    draw_text(frame, config, font, y, text, color);
}
