use review_pipeline::model::NewRepository;
use serde::Deserialize;

use crate::error_handler::AppError;

/// Body of `POST /api/repositories`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRepositoryRequest {
    pub github_id: i64,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl TryFrom<ConnectRepositoryRequest> for NewRepository {
    type Error = AppError;

    fn try_from(req: ConnectRepositoryRequest) -> Result<Self, Self::Error> {
        let owner = req.owner.trim().to_string();
        let name = req.name.trim().to_string();
        if owner.is_empty() || name.is_empty() {
            return Err(AppError::BadRequest("owner and name are required".into()));
        }
        if req.github_id <= 0 {
            return Err(AppError::BadRequest("githubId must be positive".into()));
        }

        let full_name = req
            .full_name
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| format!("{owner}/{name}"));
        let url = req
            .url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("https://github.com/{full_name}"));

        Ok(NewRepository {
            github_id: req.github_id,
            owner,
            name,
            full_name,
            url,
        })
    }
}
