//! Command implementations: dial, act, print.

use regatta_registry::Store;

pub async fn app_register(
    store: &Store,
    name: &str,
    repo_url: &str,
    stack: &str,
) -> anyhow::Result<()> {
    let app = store.new_app(name, repo_url, stack)?;
    app.register().await?;
    println!("registered app {name}");
    Ok(())
}

pub async fn app_unregister(store: &Store, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(name).await?;
    app.unregister().await?;
    println!("unregistered app {name}");
    Ok(())
}

pub async fn app_describe(store: &Store, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(name).await?;
    println!("name:     {}", app.name);
    println!("repo-url: {}", app.repo_url);
    println!("stack:    {}", app.stack);
    let env = app.env().await?;
    if !env.is_empty() {
        println!("env:");
        for (key, value) in env {
            println!("  {key}={value}");
        }
    }
    Ok(())
}

pub async fn env_get(store: &Store, app: &str, key: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    println!("{}", app.get_env(key).await?);
    Ok(())
}

pub async fn env_set(store: &Store, app: &str, key: &str, value: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    app.set_env(key, value).await?;
    Ok(())
}

pub async fn env_del(store: &Store, app: &str, key: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    app.del_env(key).await?;
    Ok(())
}

pub async fn proc_register(store: &Store, app: &str, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    let proc = store.new_proc(&app, name)?;
    proc.register().await?;
    println!("registered proc {}/{name}", app.name);
    Ok(())
}

pub async fn proc_unregister(store: &Store, app: &str, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    let proc = app.get_proc(name).await?;
    proc.unregister().await?;
    println!("unregistered proc {}/{name}", app.name);
    Ok(())
}

pub async fn rev_register(
    store: &Store,
    app: &str,
    name: &str,
    archive_url: &str,
) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    let rev = store.new_revision(&app, name, archive_url)?;
    rev.register().await?;
    println!("registered revision {}/{name}", app.name);
    Ok(())
}

pub async fn rev_unregister(store: &Store, app: &str, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    let rev = app.get_revision(name).await?;
    rev.unregister().await?;
    println!("unregistered revision {}/{name}", app.name);
    Ok(())
}

pub async fn rev_describe(store: &Store, app: &str, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    let rev = app.get_revision(name).await?;
    println!("app:         {}", rev.app_name);
    println!("name:        {}", rev.name);
    println!("archive-url: {}", rev.archive_url);
    Ok(())
}

pub async fn rev_exists(store: &Store, app: &str, name: &str) -> anyhow::Result<()> {
    let app = store.get_app(app).await?;
    match app.get_revision(name).await {
        Ok(_) => {
            println!("true");
            Ok(())
        }
        Err(regatta_registry::Error::RevisionNotFound { .. }) => {
            println!("false");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn scale(
    store: &Store,
    app: &str,
    rev: &str,
    proc: &str,
    factor: i64,
) -> anyhow::Result<()> {
    let outcome = store.scale(app, rev, proc, factor).await?;
    println!(
        "scaled {app}/{proc}@{rev}: {} -> {factor} (+{} registered, {} stopping)",
        outcome.previous,
        outcome.registered.len(),
        outcome.stopped.len(),
    );
    Ok(())
}

pub async fn init(store: &Store) -> anyhow::Result<()> {
    store.init().await?;
    println!("registry initialized");
    Ok(())
}
