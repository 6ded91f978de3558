use std::sync::Arc;

use anyhow::{bail, Result};
use coopmarket_marketplace::{
    gate, views, AccessDecision, AddMemberRequest, CreateListingRequest, ListingFilters,
    MarketError, MarketplaceFilters, RegisterCooperativeRequest, Role, Route, SignInRequest,
    SubmitMineralRequest,
};
use coopmarket_remote::LiveView;
use coopmarket_runtime::{session_store::SessionStore, shutdown_signal, ClientServices};
use tracing::info;

use crate::{render, BrowseArgs, Commands, ListingCommands, MemberCommands, WatchTarget};

impl From<BrowseArgs> for MarketplaceFilters {
    fn from(args: BrowseArgs) -> Self {
        MarketplaceFilters {
            search: args.search,
            sort: args.sort,
        }
    }
}

/// Refuse a command whose page the current session may not open.
async fn require(services: &ClientServices, route: Route) -> Result<()> {
    let session = services.session.current().await;
    match gate(route, session.as_ref()) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Redirect(_) => Err(MarketError::NotAuthenticated.into()),
        AccessDecision::Denied => Err(MarketError::Unauthorized(
            "Only cooperative administrators can do this".to_string(),
        )
        .into()),
    }
}

pub async fn run(command: Commands, services: &ClientServices, store: &SessionStore) -> Result<()> {
    match command {
        Commands::Register {
            name,
            registration_number,
            email,
            password,
            phone,
            address,
        } => {
            let outcome = services
                .auth
                .register_cooperative(&RegisterCooperativeRequest {
                    name,
                    registration_number,
                    email,
                    password,
                    phone,
                    address,
                })
                .await?;
            render::notice(&outcome.notice);
        }
        Commands::Login { email, password } => {
            let session = services
                .auth
                .sign_in(&SignInRequest { email, password })
                .await?;
            store.save(&session)?;
            println!(
                "Signed in as {} ({:?})",
                session.user.email.as_deref().unwrap_or("-"),
                Role::of(&session)
            );
        }
        Commands::Logout => {
            let signed_out = services.auth.sign_out().await;
            store.clear()?;
            signed_out?;
            println!("Signed out");
        }
        Commands::Whoami => match services.session.current().await {
            Some(session) => println!(
                "{} ({:?})",
                session.user.email.as_deref().unwrap_or(&session.user.id),
                Role::of(&session)
            ),
            None => println!("Not signed in"),
        },
        Commands::Members(MemberCommands::Add {
            full_name,
            member_code,
            email,
            password,
            phone,
        }) => {
            require(services, Route::Cooperative).await?;
            let outcome = services
                .cooperatives
                .add_member(&AddMemberRequest {
                    full_name,
                    member_code,
                    email,
                    password,
                    phone_number: phone,
                })
                .await?;
            render::notice(&outcome.notice);
        }
        Commands::Members(MemberCommands::List) => {
            require(services, Route::Cooperative).await?;
            render::members(&services.cooperatives.members().await?);
        }
        Commands::Listings(ListingCommands::New {
            mineral,
            quantity,
            unit,
            grade,
            price,
            notes,
        }) => {
            require(services, Route::MemberArea).await?;
            let outcome = services
                .members
                .create_listing(&CreateListingRequest {
                    mineral_type: mineral,
                    quantity,
                    unit,
                    quality_grade: grade,
                    price_per_unit: price,
                    notes,
                })
                .await?;
            render::notice(&outcome.notice);
            println!("Listing id: {}", outcome.record.id);
        }
        Commands::Listings(ListingCommands::List {
            search,
            mineral,
            status,
        }) => {
            require(services, Route::MemberArea).await?;
            let filters = ListingFilters {
                search,
                mineral_type: mineral,
                status,
            };
            render::listings(&services.members.listings(&filters).await?);
        }
        Commands::Submit {
            listing,
            quantity,
            notes,
        } => {
            require(services, Route::MemberArea).await?;
            let outcome = services
                .members
                .submit_mineral(&SubmitMineralRequest {
                    listing_id: listing,
                    quantity,
                    notes,
                })
                .await?;
            render::notice(&outcome.notice);
        }
        Commands::History => {
            require(services, Route::MemberArea).await?;
            render::history(&services.members.submissions().await?);
        }
        Commands::Queue => {
            require(services, Route::Cooperative).await?;
            render::queue(&services.verification.queue().await?);
        }
        Commands::Verify {
            submission,
            decision,
        } => {
            require(services, Route::Cooperative).await?;
            let outcome = services.verification.decide(&submission, decision).await?;
            render::notice(&outcome.notice);
        }
        Commands::Stats => {
            require(services, Route::Dashboard).await?;
            if services.session.is_admin().await {
                render::cooperative_stats(&[services.cooperatives.stats().await?]);
            } else {
                render::member_stats(&[services.members.stats().await?]);
            }
        }
        Commands::Marketplace(args) => {
            let filters = MarketplaceFilters::from(args);
            let listings =
                coopmarket_marketplace::queries::marketplace(services.remote.as_ref(), &filters)
                    .await?;
            render::listings(&listings);
        }
        Commands::Watch { view, filters } => watch(services, view, filters).await?,
        Commands::Route { path } => {
            let Some(route) = Route::from_path(&path) else {
                bail!("Unknown page {path}");
            };
            let session = services.session.current().await;
            match gate(route, session.as_ref()) {
                AccessDecision::Allow => println!("{route}: allowed"),
                AccessDecision::Redirect(to) => println!("{route}: redirect to {to}"),
                AccessDecision::Denied => println!("{route}: denied"),
            }
        }
    }
    Ok(())
}

async fn watch(services: &ClientServices, target: WatchTarget, filters: BrowseArgs) -> Result<()> {
    let remote = Arc::clone(&services.remote);
    match target {
        WatchTarget::Roster => {
            require(services, Route::Cooperative).await?;
            follow(views::member_roster(remote), render::members).await
        }
        WatchTarget::Queue => {
            require(services, Route::Cooperative).await?;
            follow(views::verification_queue(remote), render::queue).await
        }
        WatchTarget::History => {
            require(services, Route::MemberArea).await?;
            follow(views::submission_history(remote), render::history).await
        }
        WatchTarget::Listings => {
            require(services, Route::MemberArea).await?;
            let filters = ListingFilters {
                search: filters.search,
                ..Default::default()
            };
            follow(views::member_listings(remote, filters), render::listings).await
        }
        WatchTarget::Stats => {
            require(services, Route::Dashboard).await?;
            if services.session.is_admin().await {
                follow(views::cooperative_stats(remote), render::cooperative_stats).await
            } else {
                follow(views::member_stats(remote), render::member_stats).await
            }
        }
        WatchTarget::Marketplace => {
            follow(views::marketplace(remote, filters.into()), render::listings).await
        }
    }
}

/// Print every committed snapshot until interrupted.
async fn follow<T>(mut view: LiveView<T>, rows: fn(&[T])) -> Result<()>
where
    T: Clone + Send + Sync + 'static,
{
    let label = view.label().to_string();
    info!(view = %label, tables = ?view.watched_tables(), "following view");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            state = view.changed() => match state {
                Some(state) => render::snapshot(&label, &state, rows),
                None => break,
            },
        }
    }

    view.deactivate().await;
    Ok(())
}
