//! Maps validated CLI matches to an [`Action`].

use crate::{
    api::{Lookup, Resource},
    cli::actions::{session::LoginArgs, Action},
    session::{Role, UserId, UserIdentity},
};
use anyhow::{anyhow, Context, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("login", sub_m)) => Ok(Action::Login(login_args(sub_m)?)),
        Some(("logout", _)) => Ok(Action::Logout),
        Some(("whoami", _)) => Ok(Action::Whoami),
        Some(("validate", _)) => Ok(Action::Validate),
        Some(("callback", _)) => Ok(Action::Callback),
        Some(("route", sub_m)) => Ok(Action::Route {
            path: required(sub_m, "path")?,
        }),
        Some(("get", sub_m)) => Ok(Action::Get {
            path: required(sub_m, "path")?,
        }),
        Some(("list", sub_m)) => {
            let name = required(sub_m, "resource")?;
            let resource =
                Resource::parse(&name).ok_or_else(|| anyhow!("unknown resource: {name}"))?;
            let lookup = sub_m
                .get_one::<String>("by")
                .map(|filter| {
                    Lookup::parse(filter, sub_m.get_one::<String>("value").map(String::as_str))
                })
                .transpose()
                .map_err(|err| anyhow!(err))?;
            Ok(Action::List { resource, lookup })
        }
        _ => Err(anyhow!("no subcommand given")),
    }
}

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: {name}"))
}

fn login_args(matches: &clap::ArgMatches) -> Result<LoginArgs> {
    let role = required(matches, "role")?;
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role: {role}"))?;

    let identity = match matches.get_one::<String>("user") {
        Some(raw) => {
            let mut identity: UserIdentity =
                serde_json::from_str(raw).context("--user is not a valid identity record")?;
            identity.role = role;
            identity
        }
        None => {
            let mut identity = UserIdentity::demo(role);
            if let Some(id) = matches.get_one::<String>("id") {
                identity.id = id
                    .parse::<i64>()
                    .map_or_else(|_| UserId::Text(id.clone()), UserId::Number);
            }
            if let Some(email) = matches.get_one::<String>("email") {
                identity.email = Some(email.clone());
            }
            if let Some(nom) = matches.get_one::<String>("nom") {
                identity.nom.clone_from(nom);
            }
            if let Some(prenom) = matches.get_one::<String>("prenom") {
                identity.prenom.clone_from(prenom);
            }
            if let Some(matricule) = matches.get_one::<String>("matricule") {
                identity.matricule = Some(matricule.clone());
            }
            if let Some(specialite) = matches.get_one::<String>("specialite") {
                identity.specialite = Some(specialite.clone());
            }
            identity
        }
    };

    Ok(LoginArgs {
        role,
        identity,
        token: matches.get_one::<String>("token").cloned(),
    })
}
