use crate::cli::globals::Runtime;
use crate::session::{
    codec::{self, SessionToken},
    Role, UserIdentity,
};
use serde_json::{json, Value};

#[derive(Debug)]
pub struct LoginArgs {
    pub role: Role,
    pub identity: UserIdentity,
    /// Stored as is when present, otherwise a token is generated.
    pub token: Option<String>,
}

pub fn login(runtime: &Runtime, args: LoginArgs) -> Value {
    let (token, identity) = match args.token {
        Some(token) => {
            let token = SessionToken::new(token);
            runtime.session.login(&args.identity, &token);
            (token, args.identity)
        }
        None => runtime.session.simulate_login(args.role, args.identity),
    };

    json!({
        "user": identity,
        "token": token_report(Some(token.expose())),
        "landing": runtime.session.landing_route(),
    })
}

pub fn logout(runtime: &Runtime) -> Value {
    runtime.session.logout();
    json!({
        "authenticated": runtime.session.is_authenticated(),
        "location": runtime.location(),
    })
}

pub fn whoami(runtime: &Runtime) -> Value {
    let user = runtime.session.current_user();
    json!({
        "authenticated": runtime.session.is_authenticated(),
        "name": user.as_ref().map(UserIdentity::display_name),
        "user": user,
        "token": token_report(runtime.session.token().as_deref()),
    })
}

pub fn validate(runtime: &Runtime) -> Value {
    let valid = runtime.session.validate_token();
    json!({
        "valid": valid,
        "token": token_report(runtime.session.token().as_deref()),
    })
}

/// Token shape and claims; the token itself is never printed.
fn token_report(token: Option<&str>) -> Value {
    let Some(token) = token else {
        return Value::Null;
    };
    let claims = codec::decode_claims(token);
    json!({
        "well_formed": codec::is_well_formed(Some(token)),
        "claims": claims.as_ref().map(|claims| json!({
            "sub": claims.sub,
            "email": claims.email,
            "role": claims.role,
            "name": claims.name,
            "iat": claims.iat,
            "exp": claims.exp,
            "ext": claims.ext,
        })),
        "expired": claims.map(|claims| claims.is_expired(codec::now_unix_seconds())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{commands, globals::GlobalArgs};
    use anyhow::Result;

    fn runtime(path: &str) -> Result<Runtime> {
        let matches = commands::new().get_matches_from(vec![
            "scolaris",
            "--state-file",
            path,
            "--location",
            "/formateur/cours",
            "whoami",
        ]);
        GlobalArgs::parse(&matches)?.connect()
    }

    fn state_file() -> String {
        std::env::temp_dir()
            .join(format!("scolaris-session-{}.json", ulid::Ulid::new()))
            .display()
            .to_string()
    }

    #[test]
    fn login_whoami_logout() -> Result<()> {
        let path = state_file();
        let runtime = runtime(&path)?;

        let report = login(
            &runtime,
            LoginArgs {
                role: Role::Formateur,
                identity: UserIdentity::demo(Role::Formateur),
                token: None,
            },
        );
        assert_eq!(report["landing"], "/formateur/dashboard");
        assert_eq!(report["token"]["well_formed"], true);
        assert_eq!(report["token"]["claims"]["role"], "FORMATEUR");
        assert_eq!(report["token"]["claims"]["ext"]["specialite"], "Informatique");
        assert_eq!(report["token"]["expired"], false);

        let report = whoami(&runtime);
        assert_eq!(report["authenticated"], true);
        assert_eq!(report["name"], "Pierre Martin");

        let report = logout(&runtime);
        assert_eq!(report["authenticated"], false);
        assert_eq!(report["location"], "/login");
        assert_eq!(whoami(&runtime)["token"], Value::Null);

        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn validate_heals_supplied_malformed_token() -> Result<()> {
        let path = state_file();
        let runtime = runtime(&path)?;

        let report = login(
            &runtime,
            LoginArgs {
                role: Role::Etudiant,
                identity: UserIdentity::demo(Role::Etudiant),
                token: Some("garbage".to_string()),
            },
        );
        assert_eq!(report["token"]["well_formed"], false);
        assert_eq!(report["token"]["claims"], Value::Null);

        let report = validate(&runtime);
        assert_eq!(report["valid"], true);
        assert_eq!(report["token"]["well_formed"], true);
        assert_eq!(report["token"]["claims"]["sub"], "1");
        assert_eq!(whoami(&runtime)["authenticated"], true);

        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
