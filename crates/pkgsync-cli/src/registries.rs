use nu_ansi_term::Color::{Blue, Cyan, Green};
use pkgsync_core::{error::SyncResult, SyncContext};
use pkgsync_db::repository::PackageRepository;
use tabled::{
    builder::Builder,
    settings::{peaker::PriorityMax, themes::BorderCorrection, Panel, Style, Width},
};
use tracing::info;

use crate::utils::{term_width, Colored};

pub fn list_registries(ctx: &SyncContext) -> SyncResult<()> {
    let registries = ctx.registries()?;

    let mut builder = Builder::new();
    builder.push_record(["Name", "Ecosystem", "URL", "Packages"]);

    let mut total = 0;
    for registry in &registries {
        let count = ctx
            .db()
            .with_conn(|conn| PackageRepository::count_for_registry(conn, registry.id))?;
        total += count;

        info!(
            name = registry.name.as_str(),
            ecosystem = registry.ecosystem.as_str(),
            url = registry.url.as_str(),
            packages = count,
        );
        builder.push_record([
            format!("{}", Colored(Cyan, &registry.name)),
            registry.ecosystem.clone(),
            format!("{}", Colored(Blue, &registry.url)),
            format!("{}", Colored(Green, count)),
        ]);
    }

    let table = builder
        .build()
        .with(Panel::header(format!(
            "{} registries, {total} packages",
            registries.len()
        )))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string();
    info!("\n{table}");
    Ok(())
}
