use std::future::Future;
use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument};

use crate::auth;
use crate::cli::{
    AddArgs, CategoryCommand, Command, EditArgs, ListArgs, LoginArgs, PasswdArgs, SignupArgs,
};
use crate::error::SyncError;
use crate::lifecycle::{Operation, Operations, SubmitError, Timings};
use crate::render::{Renderer, short_id};
use crate::session::Session;
use crate::store::EntityStore;
use crate::task::{Category, Task};
use crate::transport::Transport;
use crate::validate::{
    CategoryDraft, LoginDraft, PasswordDraft, SignupDraft, TaskDraft, ValidationErrors,
};
use crate::view::{CategoryScope, Filters, ViewQuery, group};

/// Everything a command needs: the synced store, one operation instance per
/// form, and the output renderer.
#[derive(Debug)]
pub struct App<T> {
    pub store: EntityStore<T>,
    pub ops: Operations,
    pub renderer: Renderer,
    pub today: NaiveDate,
}

impl<T: Transport> App<T> {
    pub fn new(store: EntityStore<T>, timings: Timings, renderer: Renderer) -> Self {
        Self {
            store,
            ops: Operations::new(timings),
            renderer,
            today: Local::now().date_naive(),
        }
    }

    pub fn session(&self) -> &Session {
        self.store.gateway().session()
    }
}

#[instrument(skip_all)]
pub async fn dispatch<T: Transport>(app: &mut App<T>, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Login(args) => cmd_login(app, args).await,
        Command::Signup(args) => cmd_signup(app, args).await,
        Command::Logout => cmd_logout(app),
        Command::Whoami => cmd_whoami(app),
        Command::List(args) => cmd_list(app, args).await,
        Command::Add(args) => cmd_add(app, args).await,
        Command::Edit(args) => cmd_edit(app, args).await,
        Command::Toggle { task } => cmd_toggle(app, &task).await,
        Command::Delete { task } => cmd_delete(app, &task).await,
        Command::Categories => cmd_categories(app).await,
        Command::Category(CategoryCommand::Add { name }) => cmd_category_add(app, name).await,
        Command::Category(CategoryCommand::Delete { category }) => {
            cmd_category_delete(app, &category).await
        }
        Command::Passwd(args) => cmd_passwd(app, args).await,
    }
}

#[instrument(skip_all)]
async fn cmd_login<T: Transport>(app: &mut App<T>, args: LoginArgs) -> anyhow::Result<()> {
    info!("command login");

    let password = match args.password {
        Some(password) => password,
        None => prompt("Password")?,
    };

    let op = &mut app.ops.login;
    op.open_with(LoginDraft {
        email: args.email,
        password,
    });
    let Some(credentials) = op.prepare(LoginDraft::validate) else {
        return Err(rejected(op));
    };

    let user = drive(op, auth::login(app.store.gateway(), &credentials)).await?;
    println!("Signed in as {} <{}>.", user.name, user.email);
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_signup<T: Transport>(app: &mut App<T>, args: SignupArgs) -> anyhow::Result<()> {
    info!("command signup");

    let password = match args.password {
        Some(password) => password,
        None => prompt("Password")?,
    };
    let confirm = match args.confirm {
        Some(confirm) => confirm,
        None if io::stdin().is_terminal() => prompt("Confirm password")?,
        None => password.clone(),
    };

    let hint = app.renderer.strength_hint(&password);
    let op = &mut app.ops.signup;
    op.open_with(SignupDraft {
        name: args.name,
        email: args.email,
        password,
        confirm,
    });
    let Some(registration) = op.prepare(SignupDraft::validate) else {
        return Err(rejected(op));
    };
    if !hint.is_empty() {
        eprintln!("Password strength: {hint}");
    }

    let user = drive(op, auth::signup(app.store.gateway(), &registration)).await?;
    println!("Welcome, {}. You are signed in.", user.name);
    Ok(())
}

fn cmd_logout<T: Transport>(app: &App<T>) -> anyhow::Result<()> {
    info!("command logout");
    auth::logout(app.session()).context("failed to remove saved session")?;
    println!("Signed out.");
    Ok(())
}

fn cmd_whoami<T: Transport>(app: &App<T>) -> anyhow::Result<()> {
    let user = app
        .session()
        .user()
        .ok_or_else(|| anyhow!("not signed in; run `taskflow login <email>`"))?;
    app.renderer.print_user(&user)
}

#[instrument(skip_all)]
async fn cmd_list<T: Transport>(app: &mut App<T>, args: ListArgs) -> anyhow::Result<()> {
    info!("command list");
    load(app).await?;

    let scope = match args.category.as_deref() {
        Some(token) => CategoryScope::Category(resolve_category(&app.store, token)?.id.clone()),
        None => CategoryScope::All,
    };
    let query = ViewQuery {
        filters: Filters {
            status: args.status.into_iter().collect(),
            priority: args.priority.into_iter().collect(),
        },
        search: args.search.unwrap_or_default(),
        scope,
    };

    let mut groups = group(query.derive(app.store.tasks()));
    groups.show_completed = args.show_completed;
    debug!(
        pending = groups.pending.len(),
        completed = groups.completed.len(),
        "derived list"
    );

    app.renderer.print_task_groups(
        &query.scope.heading(app.store.categories()),
        &groups,
        app.store.tasks(),
        app.store.categories(),
        app.today,
    )
}

#[instrument(skip_all)]
async fn cmd_add<T: Transport>(app: &mut App<T>, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");
    load(app).await?;

    let mut draft = TaskDraft::for_categories(app.store.categories());
    if let Some(token) = args.category.as_deref() {
        draft.category_id = resolve_category(&app.store, token)?.id.clone();
    }
    draft.title = args.title.join(" ");
    draft.priority = args.priority.unwrap_or_default();
    draft.due_date = args.due.unwrap_or_default();

    let today = app.today;
    let op = &mut app.ops.add_task;
    op.open_with(draft);
    let Some(task) = op.prepare(|draft| draft.validate_new(today)) else {
        return Err(rejected(op));
    };

    drive(op, app.store.create_task(&task)).await?;
    println!("Created task \"{}\".", task.title);
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_edit<T: Transport>(app: &mut App<T>, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");
    load(app).await?;

    let mut draft = TaskDraft::from_task(resolve_task(&app.store, &args.task)?);
    if let Some(token) = args.category.as_deref() {
        draft.category_id = resolve_category(&app.store, token)?.id.clone();
    }
    if let Some(title) = args.title {
        draft.title = title;
    }
    if let Some(priority) = args.priority {
        draft.priority = priority;
    }
    if let Some(due) = args.due {
        draft.due_date = due;
    }

    let today = app.today;
    let op = &mut app.ops.edit_task;
    op.open_with(draft);
    let Some(task) = op.prepare(|draft| draft.validate_edit(today)) else {
        return Err(rejected(op));
    };

    drive(op, app.store.update_task(&task)).await?;
    println!("Modified task {}.", short_id(&task.id, app.store.tasks()));
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_toggle<T: Transport>(app: &mut App<T>, token: &str) -> anyhow::Result<()> {
    info!("command toggle");
    load(app).await?;

    let id = resolve_task(&app.store, token)?.id.clone();
    app.store.toggle_task(&id).await.map_err(surfaced)?;

    let done = app.store.task(&id).is_some_and(|task| task.completed);
    let shown = short_id(&id, app.store.tasks());
    if done {
        println!("Completed task {shown}.");
    } else {
        println!("Reopened task {shown}.");
    }
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_delete<T: Transport>(app: &mut App<T>, token: &str) -> anyhow::Result<()> {
    info!("command delete");
    load(app).await?;

    let id = resolve_task(&app.store, token)?.id.clone();
    let shown = short_id(&id, app.store.tasks()).to_string();
    let op = &mut app.ops.delete_task;
    op.open_with(Some(id.clone()));

    drive(op, app.store.delete_task(&id)).await?;
    println!("Deleted task {shown}.");
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_categories<T: Transport>(app: &mut App<T>) -> anyhow::Result<()> {
    info!("command categories");
    load(app).await?;
    app.renderer
        .print_categories(app.store.categories(), app.store.tasks())
}

#[instrument(skip_all)]
async fn cmd_category_add<T: Transport>(app: &mut App<T>, name: String) -> anyhow::Result<()> {
    info!("command category add");

    let op = &mut app.ops.add_category;
    op.open_with(CategoryDraft { name });
    let Some(name) = op.prepare(CategoryDraft::validate) else {
        return Err(rejected(op));
    };

    drive(op, app.store.create_category(&name)).await?;
    println!("Created category {name}.");
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_category_delete<T: Transport>(app: &mut App<T>, token: &str) -> anyhow::Result<()> {
    info!("command category delete");
    load(app).await?;

    let category = resolve_category(&app.store, token)?.clone();
    let filed = app
        .store
        .tasks()
        .iter()
        .filter(|task| task.category_id == category.id)
        .count();

    let op = &mut app.ops.delete_category;
    op.open_with(Some(category.id.clone()));

    drive(op, app.store.delete_category(&category.id)).await?;
    println!("Deleted category {} and {filed} task(s).", category.name);
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_passwd<T: Transport>(app: &mut App<T>, args: PasswdArgs) -> anyhow::Result<()> {
    info!("command passwd");

    let old_password = match args.old {
        Some(old) => old,
        None => prompt("Current password")?,
    };
    let new_password = match args.new {
        Some(new) => new,
        None => prompt("New password")?,
    };
    let confirm = match args.confirm {
        Some(confirm) => confirm,
        None if io::stdin().is_terminal() => prompt("Confirm new password")?,
        None => new_password.clone(),
    };

    let hint = app.renderer.strength_hint(&new_password);
    let op = &mut app.ops.change_password;
    op.open_with(PasswordDraft {
        old_password,
        new_password,
        confirm,
    });
    let Some(change) = op.prepare(PasswordDraft::validate) else {
        return Err(rejected(op));
    };
    if !hint.is_empty() {
        eprintln!("Password strength: {hint}");
    }

    drive(op, auth::change_password(app.store.gateway(), &change)).await?;
    println!("Password changed.");
    Ok(())
}

async fn load<T: Transport>(app: &mut App<T>) -> anyhow::Result<()> {
    app.store.load_all().await.map_err(surfaced)
}

/// Submits through `op`, then closes it and waits out the reset so the
/// instance ends the command back in `Idle`.
async fn drive<D, R, F>(op: &mut Operation<D>, action: F) -> anyhow::Result<R>
where
    D: Default,
    F: Future<Output = Result<R, SyncError>>,
{
    let outcome = op.submit(action).await;
    let message = op.error_message().map(str::to_string);
    let needs_login = op.requires_login();
    op.close();
    op.settle().await;

    match outcome {
        Ok(value) => Ok(value),
        Err(SubmitError::Failed(err)) => {
            let mut message = message.unwrap_or_else(|| err.user_message());
            if needs_login {
                message.push_str(" Run `taskflow login <email>`.");
            }
            Err(anyhow::Error::new(err).context(message))
        }
        Err(other) => Err(other.into()),
    }
}

fn surfaced(err: SyncError) -> anyhow::Error {
    let mut message = err.user_message();
    if err.is_auth_expired() {
        message.push_str(" Run `taskflow login <email>`.");
    }
    anyhow::Error::new(err).context(message)
}

fn rejected<D: Default>(op: &mut Operation<D>) -> anyhow::Error {
    let errors: ValidationErrors = op.field_errors().clone();
    op.close();
    anyhow::Error::new(errors).context("invalid input")
}

/// Exact id first, then the one task whose id starts or ends with `token`.
/// The short form shown by `list` is an id tail.
fn resolve_task<'a, T: Transport>(
    store: &'a EntityStore<T>,
    token: &str,
) -> anyhow::Result<&'a Task> {
    find_task(store.tasks(), token)
}

fn find_task<'a>(tasks: &'a [Task], token: &str) -> anyhow::Result<&'a Task> {
    let token = token.trim();
    if let Some(task) = tasks.iter().find(|task| task.id == token) {
        return Ok(task);
    }
    if token.is_empty() {
        return Err(anyhow!("no task id given"));
    }

    let mut matches = tasks
        .iter()
        .filter(|task| task.id.ends_with(token) || task.id.starts_with(token));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no task matches {token}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("task id {token} is ambiguous"));
    }
    Ok(first)
}

/// Exact id, then a case-insensitive name, then a unique id prefix.
fn resolve_category<'a, T: Transport>(
    store: &'a EntityStore<T>,
    token: &str,
) -> anyhow::Result<&'a Category> {
    if let Some(category) = store.category(token) {
        return Ok(category);
    }

    let categories = store.categories();
    if let Some(category) = categories
        .iter()
        .find(|category| category.name.eq_ignore_ascii_case(token.trim()))
    {
        return Ok(category);
    }

    let mut matches = categories
        .iter()
        .filter(|category| category.id.starts_with(token));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no category matches {token}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("category id {token} is ambiguous"));
    }
    Ok(first)
}

fn prompt(label: &str) -> anyhow::Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("{label}: ");
        io::stderr().flush()?;
    }

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("failed to read {}", label.to_lowercase()))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
