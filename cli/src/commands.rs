use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use common::ai::ChatRequest;
use common::{
    format_response, poll_until_terminal, ApiClient, ApiError, Application, DashboardStats,
    JobStatus, ListLoader, Mutation, NewAdmin, Notice, OptimisticList, TrainingJob,
    TrainingWorkspace, UploadedFile, UserAction,
};

use crate::output::{human_size, when, Format};
use crate::render::render;
use crate::{
    AdminCommand, AlreadyReported, Ctx, EngineerCommand, FileCommand, TrainingCommand, UserCommand,
    VectorDbCommand,
};

struct PendingLoader(Arc<ApiClient>);

#[async_trait]
impl ListLoader<Application> for PendingLoader {
    async fn load(&self) -> Result<Vec<Application>, ApiError> {
        self.0.pending_engineers().await
    }
}

struct FilesLoader(Arc<ApiClient>);

#[async_trait]
impl ListLoader<UploadedFile> for FilesLoader {
    async fn load(&self) -> Result<Vec<UploadedFile>, ApiError> {
        self.0.list_training_files().await
    }
}

fn stats_pairs(stats: &DashboardStats) -> Vec<(&'static str, String)> {
    vec![
        ("Total users", stats.total_users.to_string()),
        ("Engineers", stats.total_engineers.to_string()),
        ("Customers", stats.total_customers.to_string()),
        ("Administrators", stats.total_admins.to_string()),
        ("Pending applications", stats.pending_applications.to_string()),
        ("Training files", stats.training_files.to_string()),
        ("Training jobs", stats.training_jobs.to_string()),
    ]
}

pub async fn stats(ctx: &Ctx) -> Result<()> {
    let stats = ctx.client.stats().await.context("Loading dashboard stats")?;
    ctx.out.record(&stats, stats_pairs(&stats))
}

pub async fn dashboard(ctx: &Ctx) -> Result<()> {
    let overview = ctx.client.dashboard().await.context("Loading dashboard")?;
    if ctx.out.format() != Format::Table {
        return ctx.out.record(&overview, stats_pairs(&overview.stats));
    }
    ctx.out.record(&overview.stats, stats_pairs(&overview.stats))?;
    println!("\nRecent activity");
    ctx.out.rows(&["When", "Activity"], &overview.recent_activity, |a| {
        vec![when(a.timestamp), a.description.clone()]
    })
}

fn print_applications(ctx: &Ctx, applications: &[Application]) -> Result<()> {
    ctx.out.rows(&["ID", "Name", "Email", "Status", "Submitted"], applications, |a| {
        vec![
            a.id.clone(),
            a.user.full_name.clone(),
            a.user.email.clone(),
            a.status.to_string(),
            when(a.submitted_at),
        ]
    })
}

pub async fn engineers(ctx: &Ctx, action: EngineerCommand) -> Result<()> {
    match action {
        EngineerCommand::Pending => {
            let pending = ctx.client.pending_engineers().await.context("Loading applications")?;
            print_applications(ctx, &pending)
        }
        EngineerCommand::Approve { id } => decide(ctx, &id, None).await,
        EngineerCommand::Reject { id, reason } => {
            if reason.trim().is_empty() {
                bail!("A rejection reason is required");
            }
            decide(ctx, &id, Some(reason)).await
        }
    }
}

/// Approve (no reason) or reject an application.
///
/// The pending count drops as soon as the request is sent; the list shown
/// afterwards is the server's copy fetched after the refresh delay.
async fn decide(ctx: &Ctx, id: &str, rejection: Option<String>) -> Result<()> {
    let pending = ctx.client.pending_engineers().await.context("Loading applications")?;
    if !pending.iter().any(|a| a.id == id) {
        log::warn!("Application {} is not in the pending list", id);
    }

    let list = OptimisticList::new(pending, ctx.polling.refresh_delay(), ctx.sink.clone())
        .on_count(|count| eprintln!("Pending applications: {}", count));
    let loader = Arc::new(PendingLoader(ctx.client.clone()));

    let client = ctx.client.clone();
    let verb = if rejection.is_some() { "rejected" } else { "approved" };
    let action = async {
        match &rejection {
            Some(reason) => client.reject_engineer(id, reason).await,
            None => client.approve_engineer(id).await,
        }
    };

    let submission = list.submit(id, Mutation::Remove, action, loader).await;
    let failed = submission.result.is_err();
    if !failed {
        ctx.sink.notify(&Notice::success(format!("Application {} {}", id, verb)));
    }
    submission.reconcile.await.context("Refresh task failed")?;
    print_applications(ctx, &list.snapshot())?;

    if failed {
        return Err(AlreadyReported.into());
    }
    Ok(())
}

pub async fn admins(ctx: &Ctx, action: AdminCommand) -> Result<()> {
    match action {
        AdminCommand::List => {
            let admins = ctx.client.list_admins().await.context("Loading administrators")?;
            ctx.out.rows(&["ID", "Email", "Name", "Active", "Created"], &admins, |a| {
                vec![
                    a.id.clone(),
                    a.email.clone(),
                    a.full_name.clone(),
                    if a.is_active { "yes" } else { "no" }.to_string(),
                    when(a.created_at),
                ]
            })
        }
        AdminCommand::Create { email, name, password } => {
            let admin = NewAdmin { email: email.trim().to_string(), full_name: name, password };
            ctx.client.create_admin(&admin).await.context("Creating administrator")?;
            ctx.out.done(&format!("Created administrator {}", admin.email));
            Ok(())
        }
    }
}

pub async fn users(ctx: &Ctx, action: UserCommand) -> Result<()> {
    let (id, action) = match action {
        UserCommand::Activate { id } => (id, UserAction::Activate),
        UserCommand::Suspend { id } => (id, UserAction::Suspend),
        UserCommand::Deactivate { id } => (id, UserAction::Deactivate),
    };
    ctx.client
        .set_user_state(&id, action)
        .await
        .with_context(|| format!("Updating user {}", id))?;
    ctx.out.done(&format!("User {} {}", id, action.past_tense()));
    Ok(())
}

pub async fn health(ctx: &Ctx) -> Result<()> {
    let snapshot = ctx.client.health().await.context("Checking AI service health")?;
    let mut pairs = vec![("Overall", snapshot.status.clone())];
    for (name, service) in &snapshot.services {
        let value = match &service.detail {
            Some(detail) => format!("{} ({})", service.status, detail),
            None => service.status.clone(),
        };
        pairs.push((name.as_str(), value));
    }
    ctx.out.record(&snapshot, pairs)?;

    if !snapshot.is_healthy() {
        let degraded = snapshot.unhealthy_services();
        let message = if degraded.is_empty() {
            format!("AI service reports status {}", snapshot.status)
        } else {
            format!("Degraded services: {}", degraded.join(", "))
        };
        ctx.sink.notify(&Notice::warning(message));
    }
    Ok(())
}

fn print_files(ctx: &Ctx, files: &[UploadedFile]) -> Result<()> {
    ctx.out.rows(&["ID", "Name", "Size", "Type", "Uploaded"], files, |f| {
        vec![
            f.id.clone(),
            f.name.clone(),
            human_size(f.size),
            f.file_type.clone(),
            when(f.uploaded_at),
        ]
    })
}

pub async fn files(ctx: &Ctx, action: FileCommand) -> Result<()> {
    match action {
        FileCommand::List => {
            let files = ctx.client.list_training_files().await.context("Loading training files")?;
            print_files(ctx, &files)
        }
        FileCommand::Upload { paths } => {
            let mut workspace = TrainingWorkspace::new();
            let mut failures = 0;
            for path in &paths {
                match workspace.upload(&ctx.client, path).await {
                    Ok(stored) => {
                        for file in stored {
                            log::info!("Stored {} as {}", file.name, file.id);
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        ctx.sink.notify(&e.notice(&format!("Uploading {}", path.display())));
                    }
                }
            }
            print_files(ctx, &workspace.uploaded_files)?;
            if failures > 0 {
                return Err(AlreadyReported.into());
            }
            Ok(())
        }
        FileCommand::Delete { ids } => delete_files(ctx, &ids).await,
        FileCommand::Preview { id } => {
            let preview = ctx
                .client
                .preview_training_file(&id)
                .await
                .with_context(|| format!("Previewing {}", id))?;
            if ctx.out.format() == Format::Json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
                return Ok(());
            }
            match (&preview.filename, preview.file_id.is_empty()) {
                (Some(name), true) => println!("== {} ==", name),
                (Some(name), false) => println!("== {} ({}) ==", name, preview.file_id),
                (None, false) => println!("== {} ==", preview.file_id),
                (None, true) => {}
            }
            println!("{}", preview.text);
            if preview.truncated {
                println!("[preview truncated]");
            }
            Ok(())
        }
    }
}

/// Remove the files locally, delete them on the server, then show the re-fetched list.
///
/// One id goes to the single-file endpoint, several share one bulk request.
async fn delete_files(ctx: &Ctx, ids: &[String]) -> Result<()> {
    let current = ctx.client.list_training_files().await.context("Loading training files")?;
    let list = OptimisticList::new(current, ctx.polling.refresh_delay(), ctx.sink.clone());
    let loader = Arc::new(FilesLoader(ctx.client.clone()));

    let client = ctx.client.clone();
    let action = async {
        match ids {
            [id] => client.delete_training_file(id).await,
            _ => client.delete_training_files(ids).await,
        }
    };
    let submission = list.submit_batch(ids, Mutation::Remove, action, loader).await;
    let failed = submission.result.is_err();
    if !failed {
        let message = match ids {
            [id] => format!("Deleted {}", id),
            _ => format!("Deleted {} files", ids.len()),
        };
        ctx.sink.notify(&Notice::success(message));
    }
    submission.reconcile.await.context("Refresh task failed")?;
    print_files(ctx, &list.snapshot())?;

    if failed {
        return Err(AlreadyReported.into());
    }
    Ok(())
}

fn print_jobs(ctx: &Ctx, jobs: &[TrainingJob]) -> Result<()> {
    ctx.out.rows(&["ID", "Name", "Status", "Progress", "Started", "Finished", "Error"], jobs, |j| {
        vec![
            j.id.clone(),
            j.display_name().to_string(),
            j.status.to_string(),
            format!("{}%", j.progress),
            when(Some(j.created_at)),
            when(j.completed_at),
            j.error.clone().unwrap_or_default(),
        ]
    })
}

pub async fn training(ctx: &Ctx, action: TrainingCommand) -> Result<()> {
    match action {
        TrainingCommand::Start { name, files, watch } => {
            let mut workspace = TrainingWorkspace::new();
            workspace
                .refresh_files(&ctx.client)
                .await
                .context("Loading training files")?;

            if !files.is_empty() {
                let uploaded = &workspace.uploaded_files;
                let missing = files.iter().find(|id| !uploaded.iter().any(|f| &f.id == *id));
                if let Some(missing) = missing {
                    bail!("No uploaded file with id {}", missing);
                }
                workspace.uploaded_files.retain(|f| files.contains(&f.id));
            }

            let job = workspace
                .start_training(&ctx.client, &name)
                .await
                .context("Starting training")?;
            ctx.out.done(&format!("Training {} queued as {}", job.display_name(), job.id));

            if watch {
                watch_jobs(ctx).await
            } else {
                print_jobs(ctx, &workspace.training_jobs)
            }
        }
        TrainingCommand::Jobs => {
            let jobs = ctx.client.training_jobs().await.context("Loading training jobs")?;
            print_jobs(ctx, &jobs)
        }
        TrainingCommand::Watch => watch_jobs(ctx).await,
    }
}

/// Poll training jobs until none is queued or running, printing changes as they appear.
async fn watch_jobs(ctx: &Ctx) -> Result<()> {
    let interval = ctx.polling.training_jobs_interval();
    ctx.sink.notify(&Notice::info(format!(
        "Watching training jobs every {}s until none is active",
        interval.as_secs()
    )));
    let mut seen: HashMap<String, (JobStatus, u8)> = HashMap::new();

    let jobs = poll_until_terminal(
        interval,
        ctx.sink.as_ref(),
        || {
            let client = ctx.client.clone();
            async move { client.training_jobs().await }
        },
        |jobs: &[TrainingJob]| {
            for job in jobs {
                let state = (job.status, job.progress);
                if seen.get(&job.id) != Some(&state) {
                    eprintln!(
                        "{:<12} {:<24} {:<12} {:>3}%",
                        job.id,
                        job.display_name(),
                        job.status.as_str(),
                        job.progress
                    );
                    seen.insert(job.id.clone(), state);
                }
            }
        },
    )
    .await;

    print_jobs(ctx, &jobs)
}

pub async fn vectordb(ctx: &Ctx, action: VectorDbCommand) -> Result<()> {
    match action {
        VectorDbCommand::Status => {
            let status = ctx
                .client
                .vector_db_status()
                .await
                .context("Loading vector database status")?;
            let pairs = vec![
                ("Connected", if status.connected { "yes" } else { "no" }.to_string()),
                ("Collections", status.collections.len().to_string()),
                ("Total objects", status.total_objects.to_string()),
            ];
            ctx.out.record(&status, pairs)?;
            if ctx.out.format() == Format::Table && !status.collections.is_empty() {
                ctx.out.rows(&["Collection", "Objects"], &status.collections, |c| {
                    vec![c.name.clone(), c.object_count.to_string()]
                })?;
            }
            Ok(())
        }
        VectorDbCommand::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear the vector database without --yes");
            }
            ctx.client.clear_vector_db().await.context("Clearing vector database")?;
            ctx.out.done("Vector database cleared");
            Ok(())
        }
        VectorDbCommand::Drop { collection, yes } => {
            if !yes {
                bail!("Refusing to drop collection {} without --yes", collection);
            }
            ctx.client
                .delete_collection(&collection)
                .await
                .with_context(|| format!("Dropping collection {}", collection))?;
            ctx.out.done(&format!("Collection {} dropped", collection));
            Ok(())
        }
    }
}

pub async fn chat(
    ctx: &Ctx,
    message: String,
    conversation: Option<String>,
    raw: bool,
) -> Result<()> {
    let request = ChatRequest { message, conversation_id: conversation };
    let reply = ctx.client.chat(&request).await.context("Asking the assistant")?;
    let formatted = format_response(&reply.response);

    if ctx.out.format() == Format::Json {
        let body = serde_json::json!({ "reply": reply, "formatted": formatted });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if raw {
        println!("{}", reply.response);
    } else {
        print!("{}", render(&formatted));
    }
    if !reply.sources.is_empty() {
        println!("\nSources:");
        for source in &reply.sources {
            match source.score {
                Some(score) => println!("  - {} ({:.2})", source.title, score),
                None => println!("  - {}", source.title),
            }
        }
    }
    if let Some(id) = &reply.conversation_id {
        eprintln!("conversation: {}", id);
    }
    Ok(())
}

fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub async fn search(ctx: &Ctx, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Search query is empty");
    }
    let hits = ctx.client.search(query, limit.max(1)).await.context("Searching knowledge base")?;
    ctx.out.rows(&["Score", "Source", "Excerpt"], &hits, |h| {
        vec![
            format!("{:.2}", h.score),
            h.source.clone().unwrap_or_else(|| "-".to_string()),
            excerpt(&h.content, 80),
        ]
    })
}

pub async fn suggest(ctx: &Ctx, message: &str) -> Result<()> {
    let suggestions = ctx.client.suggestions(message).await.context("Loading suggestions")?;
    ctx.out.rows(&["Suggestion"], &suggestions, |s| vec![s.clone()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Output;
    use common::notice::CollectingSink;
    use common::session::StaticSession;
    use common::{ApiConfig, PollingConfig, Severity};
    use mockito::{Matcher, Server};

    fn ctx_for(server: &Server) -> (Ctx, Arc<CollectingSink>) {
        let config = ApiConfig {
            base_url: format!("{}/api/v1", server.url()),
            ..ApiConfig::default()
        };
        let session = Arc::new(StaticSession::new(Some("t".into())));
        let sink = Arc::new(CollectingSink::default());
        let ctx = Ctx {
            client: Arc::new(ApiClient::new(&config, session).unwrap()),
            polling: PollingConfig { refresh_delay_ms: 10, ..PollingConfig::default() },
            out: Output::new(Format::Json),
            sink: sink.clone(),
        };
        (ctx, sink)
    }

    const THREE_FILES: &str = r#"{"files": [
        {"id": "a", "filename": "a.pdf", "size": 10},
        {"id": "b", "filename": "b.pdf", "size": 20},
        {"id": "c", "filename": "c.pdf", "size": 30}]}"#;

    #[tokio::test]
    async fn test_bulk_delete_refetches_list() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/api/v1/ai/training-files")
            .with_status(200)
            .with_body(THREE_FILES)
            .expect(2)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/api/v1/ai/training-files")
            .match_body(Matcher::Json(serde_json::json!({"file_ids": ["a", "b"]})))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let (ctx, sink) = ctx_for(&server);
        delete_files(&ctx, &["a".to_string(), "b".to_string()]).await.unwrap();

        delete.assert_async().await;
        list.assert_async().await;
        let notices = sink.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].severity, Severity::Success);
        assert_eq!(notices[0].message, "Deleted 2 files");
    }

    #[tokio::test]
    async fn test_failed_bulk_delete_still_refetches() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/api/v1/ai/training-files")
            .with_status(200)
            .with_body(THREE_FILES)
            .expect(2)
            .create_async()
            .await;
        let _delete = server
            .mock("DELETE", "/api/v1/ai/training-files")
            .with_status(500)
            .create_async()
            .await;

        let (ctx, sink) = ctx_for(&server);
        let err = delete_files(&ctx, &["a".to_string(), "c".to_string()]).await.unwrap_err();
        assert!(err.is::<AlreadyReported>());

        list.assert_async().await;
        assert_eq!(sink.notices()[0].severity, Severity::Error);
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\n  b", 10), "a b");
        let long = "x".repeat(100);
        let cut = excerpt(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_stats_pairs_order() {
        let stats = DashboardStats { pending_applications: 4, ..DashboardStats::default() };
        let pairs = stats_pairs(&stats);
        assert_eq!(pairs[0].0, "Total users");
        assert_eq!(pairs[4], ("Pending applications", "4".to_string()));
    }
}
