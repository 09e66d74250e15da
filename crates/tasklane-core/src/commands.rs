use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, anyhow};
use tasklane_shared::{TaskCreate, TaskPatch, TaskStatus};
use tracing::{debug, info, instrument, warn};

use crate::auth::Session;
use crate::cli::{Command, ThemeAction};
use crate::config::Config;
use crate::dashboard::{Dashboard, StatusFilter};
use crate::error::ApiError;
use crate::gesture::{DragSensor, GestureEvent, ReorderCommand};
use crate::ordering::{RejectReason, ReorderOutcome};
use crate::preferences::{ThemeMode, ThemePreference};
use crate::render::Renderer;
use crate::session::{SessionClient, SessionObserver};
use crate::storage::KeyValueStore;
use crate::todos::TodoStore;

/// Remembers that the session expired so the command can point the user at
/// `tasklane login` once it finishes.
#[derive(Debug, Default)]
pub struct CliObserver {
    expired: AtomicBool,
}

impl CliObserver {
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl SessionObserver for CliObserver {
    fn session_expired(&self) {
        warn!("session expired; login required");
        self.expired.store(true, Ordering::SeqCst);
    }
}

pub struct App {
    session: Session,
    dashboard: Dashboard,
    theme: ThemePreference,
    renderer: Renderer,
    observer: Arc<CliObserver>,
}

impl App {
    pub fn new(cfg: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let observer = Arc::new(CliObserver::default());
        let client = Arc::new(SessionClient::new(
            &cfg.client_settings()?,
            store.clone(),
            observer.clone(),
        )?);

        let fallback = cfg
            .get("theme")
            .unwrap_or_else(|| "system".to_string())
            .parse()?;
        let theme = ThemePreference::load(store, fallback)?;
        let renderer = Renderer::new(cfg, theme.mode());

        Ok(Self {
            session: Session::new(client.clone()),
            dashboard: Dashboard::new(TodoStore::new(client), cfg.page_size()?),
            theme,
            renderer,
            observer,
        })
    }

    #[instrument(skip(self, command))]
    pub async fn dispatch(&mut self, command: Command) -> anyhow::Result<()> {
        debug!(?command, "dispatching command");

        let result = match command {
            Command::Login { email, password } => self.cmd_login(&email, password).await,
            Command::Register {
                email,
                user_name,
                password,
            } => self.cmd_register(&email, &user_name, password).await,
            Command::Logout => self.cmd_logout().await,
            Command::Whoami => self.cmd_whoami().await,
            Command::List { status, page } => self.cmd_list(status, page).await,
            Command::Show { id } => self.cmd_show(&id).await,
            Command::Add {
                title,
                description,
                due,
                priority,
                completed,
            } => {
                let data = TaskCreate {
                    title,
                    description,
                    status: completed.then_some(TaskStatus::Completed),
                    due_date: due,
                    priority,
                };
                self.cmd_add(&data).await
            }
            Command::Edit {
                id,
                title,
                description,
                clear_description,
                due,
                clear_due,
                priority,
                status,
            } => {
                let patch = TaskPatch {
                    title,
                    description: if clear_description {
                        Some(None)
                    } else {
                        description.map(Some)
                    },
                    status,
                    due_date: if clear_due { Some(None) } else { due.map(Some) },
                    priority,
                };
                self.cmd_edit(&id, &patch).await
            }
            Command::Toggle { id } => self.cmd_toggle(&id).await,
            Command::Delete { id } => self.cmd_delete(&id).await,
            Command::Theme { action } => self.cmd_theme(action),
            Command::Shell => self.cmd_shell().await,
        };

        if self.observer.expired() {
            self.renderer
                .print_error("Session expired. Run `tasklane login` to sign in again.")?;
        }
        result
    }

    async fn cmd_login(&mut self, email: &str, password: Option<String>) -> anyhow::Result<()> {
        let password = resolve_password(password)?;
        let user = self.session.login(email, &password).await?;
        info!(email = %user.email, "login complete");
        print!("Signed in as ");
        self.renderer.print_user(&user)
    }

    async fn cmd_register(
        &mut self,
        email: &str,
        user_name: &str,
        password: Option<String>,
    ) -> anyhow::Result<()> {
        let password = resolve_password(password)?;
        let user = self.session.register(email, &password, user_name).await?;
        print!("Welcome, ");
        self.renderer.print_user(&user)
    }

    async fn cmd_logout(&mut self) -> anyhow::Result<()> {
        self.session.logout().await?;
        println!("Signed out.");
        Ok(())
    }

    async fn cmd_whoami(&mut self) -> anyhow::Result<()> {
        if !self.session.has_credential()? {
            println!("Not signed in.");
            return Ok(());
        }
        let user = self.session.current_user().await?;
        self.renderer.print_user(&user)
    }

    async fn cmd_list(&mut self, status: Option<TaskStatus>, page: usize) -> anyhow::Result<()> {
        let filter = match status {
            None => StatusFilter::All,
            Some(TaskStatus::Pending) => StatusFilter::Pending,
            Some(TaskStatus::Completed) => StatusFilter::Completed,
        };
        self.dashboard.set_filter(filter).await?;
        self.dashboard.set_page(page.saturating_sub(1));
        self.print_dashboard()
    }

    async fn cmd_show(&mut self, token: &str) -> anyhow::Result<()> {
        self.dashboard.refresh().await?;
        let id = self.resolve(token)?;
        let task = self
            .dashboard
            .working_set()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("no task matches {token}"))?;
        self.renderer.print_task_info(&task)
    }

    async fn cmd_add(&mut self, data: &TaskCreate) -> anyhow::Result<()> {
        let created = self.dashboard.create(data).await?;
        println!("Created task {} ({}).", created.title, created.id);
        Ok(())
    }

    async fn cmd_edit(&mut self, token: &str, patch: &TaskPatch) -> anyhow::Result<()> {
        if patch.is_empty() {
            return Err(anyhow!("nothing to change; pass at least one field"));
        }
        self.dashboard.refresh().await?;
        let id = self.resolve(token)?;
        let updated = self.dashboard.update(&id, patch).await?;
        println!("Updated task {}.", updated.title);
        Ok(())
    }

    async fn cmd_toggle(&mut self, token: &str) -> anyhow::Result<()> {
        self.dashboard.refresh().await?;
        let id = self.resolve(token)?;
        let updated = self.dashboard.toggle(&id).await?;
        println!("{} is now {}.", updated.title, updated.status.as_str());
        Ok(())
    }

    async fn cmd_delete(&mut self, token: &str) -> anyhow::Result<()> {
        self.dashboard.refresh().await?;
        let id = self.resolve(token)?;
        self.dashboard.delete(&id).await?;
        println!("Deleted task {id}.");
        Ok(())
    }

    fn cmd_theme(&mut self, action: ThemeAction) -> anyhow::Result<()> {
        let mode = match action {
            ThemeAction::Show => self.theme.mode(),
            ThemeAction::Toggle => self.theme.toggle()?,
            ThemeAction::Dark => {
                self.theme.set(ThemeMode::Dark)?;
                ThemeMode::Dark
            }
            ThemeAction::Light => {
                self.theme.set(ThemeMode::Light)?;
                ThemeMode::Light
            }
        };
        self.renderer.set_theme(mode);
        println!("theme: {}", theme_name(mode));
        Ok(())
    }

    async fn cmd_shell(&mut self) -> anyhow::Result<()> {
        info!("starting interactive shell");
        if let Err(err) = self.dashboard.refresh().await {
            self.report(&err)?;
        }
        self.print_dashboard()?;

        let mut sensor = DragSensor::new();
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        loop {
            print!("tasklane> ");
            io::stdout().flush()?;

            let Some(line) = lines.next() else {
                break;
            };
            let line = line.context("failed reading from stdin")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.shell_step(line, &mut sensor).await {
                Ok(ShellFlow::Continue) => {}
                Ok(ShellFlow::Quit) => break,
                Err(err) => self.renderer.print_error(&format!("{err:#}"))?,
            }

            if self.observer.expired() {
                self.renderer
                    .print_error("Session expired. Run `tasklane login` to sign in again.")?;
                break;
            }
        }

        Ok(())
    }

    async fn shell_step(&mut self, line: &str, sensor: &mut DragSensor) -> anyhow::Result<ShellFlow> {
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));
        debug!(verb, rest, "shell command");

        match verb {
            "quit" | "exit" | "q" => return Ok(ShellFlow::Quit),
            "help" | "?" => print_shell_help(),
            "list" | "ls" => self.print_dashboard()?,
            "next" | "n" => {
                if !self.dashboard.next_page() {
                    println!("Already on the last page.");
                }
                self.print_dashboard()?;
            }
            "prev" | "p" => {
                if !self.dashboard.prev_page() {
                    println!("Already on the first page.");
                }
                self.print_dashboard()?;
            }
            "page" => {
                let number: usize = rest
                    .parse()
                    .map_err(|_| anyhow!("usage: page <number>"))?;
                self.dashboard.set_page(number.saturating_sub(1));
                self.print_dashboard()?;
            }
            "filter" => {
                let filter: StatusFilter = rest.parse()?;
                let result = self.dashboard.set_filter(filter).await;
                self.finish_mutation(result)?;
            }
            "refresh" | "r" => {
                let result = self.dashboard.refresh().await;
                self.finish_mutation(result)?;
            }
            "add" => {
                let result = self.dashboard.create(&TaskCreate::titled(rest)).await;
                self.finish_mutation(result.map(|_| ()))?;
            }
            "toggle" | "t" => {
                let id = self.resolve(rest)?;
                let result = self.dashboard.toggle(&id).await;
                self.finish_mutation(result.map(|_| ()))?;
            }
            "delete" | "rm" => {
                let id = self.resolve(rest)?;
                let result = self.dashboard.delete(&id).await;
                self.finish_mutation(result)?;
            }
            "move" | "mv" => {
                let (source, target) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: move <task> <target>"))?;
                let source = self.resolve(source)?;
                let target = self.resolve(target.trim())?;
                if !self.dashboard.working_set().can_drag(&source) {
                    println!("Completed tasks stay at the bottom and cannot be moved.");
                    return Ok(ShellFlow::Continue);
                }
                let set = self.dashboard.working_set();
                sensor.handle(GestureEvent::KeyPick { id: source }, set);
                sensor.handle(
                    GestureEvent::Over {
                        target: Some(target),
                    },
                    set,
                );
                let command = sensor.handle(GestureEvent::KeyDrop, set);
                self.apply_reorder(command)?;
            }
            "up" | "down" => {
                let source = self.resolve(rest)?;
                let delta = if verb == "up" { -1 } else { 1 };
                if !self.dashboard.working_set().can_drag(&source) {
                    println!("Completed tasks stay at the bottom and cannot be moved.");
                    return Ok(ShellFlow::Continue);
                }
                let set = self.dashboard.working_set();
                sensor.handle(GestureEvent::KeyPick { id: source }, set);
                sensor.handle(GestureEvent::KeyStep { delta }, set);
                let command = sensor.handle(GestureEvent::KeyDrop, set);
                self.apply_reorder(command)?;
            }
            "theme" => {
                let mode = self.theme.toggle()?;
                self.renderer.set_theme(mode);
                println!("theme: {}", theme_name(mode));
            }
            other => return Err(anyhow!("unknown command: {other} (try `help`)")),
        }

        Ok(ShellFlow::Continue)
    }

    /// Failures are shown inline and the previous list stays on screen.
    fn finish_mutation(&self, result: Result<(), ApiError>) -> anyhow::Result<()> {
        if let Err(err) = result {
            self.report(&err)?;
        }
        self.print_dashboard()
    }

    fn apply_reorder(&mut self, command: Option<ReorderCommand>) -> anyhow::Result<()> {
        let Some(command) = command else {
            println!("Order unchanged.");
            return Ok(());
        };
        match self.dashboard.apply(&command) {
            ReorderOutcome::Moved => self.print_dashboard()?,
            ReorderOutcome::Unchanged => println!("Order unchanged."),
            ReorderOutcome::Rejected(RejectReason::SourceCompleted) => {
                println!("Completed tasks stay at the bottom and cannot be moved.")
            }
            ReorderOutcome::Rejected(reason) => println!("Cannot move: {reason:?}."),
        }
        Ok(())
    }

    fn report(&self, err: &ApiError) -> anyhow::Result<()> {
        let message = self
            .dashboard
            .error()
            .unwrap_or_else(|| err.user_message("Request failed"));
        self.renderer.print_error(&message)
    }

    fn resolve(&self, token: &str) -> anyhow::Result<String> {
        self.dashboard
            .resolve(token)
            .ok_or_else(|| anyhow!("no unique task matches {token:?}"))
    }

    fn print_dashboard(&self) -> anyhow::Result<()> {
        self.renderer
            .print_summary(self.dashboard.filter(), self.dashboard.counts())?;
        if let Some(error) = self.dashboard.error() {
            self.renderer.print_error(&error)?;
        }
        self.renderer
            .print_task_table(self.dashboard.visible(), self.dashboard.page_info())
    }
}

enum ShellFlow {
    Continue,
    Quit,
}

fn resolve_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    std::env::var("TASKLANE_PASSWORD")
        .map_err(|_| anyhow!("pass --password or set TASKLANE_PASSWORD"))
}

fn theme_name(mode: ThemeMode) -> &'static str {
    match mode {
        ThemeMode::Light => "light",
        ThemeMode::Dark => "dark",
    }
}

fn print_shell_help() {
    println!(
        "\
list                 show the current page
next | prev          page through the list
page <n>             jump to page n
filter <all|pending|completed>
refresh              fetch tasks again
add <title>          create a task
toggle <task>        flip pending/completed
delete <task>        remove a task
move <task> <target> drag a task onto another's slot
up <task> | down <task>
theme                toggle dark/light
quit"
    );
}
