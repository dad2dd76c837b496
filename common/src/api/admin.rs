use reqwest::Method;
use serde_json::json;

use super::{segment, ApiClient};
use crate::admin::{
    AdminAccount, Application, DashboardOverview, DashboardStats, NewAdmin, UserAction,
};
use crate::error::ApiError;
use crate::wire::{decode_enveloped, decode_list, decode_object};

impl ApiClient {
    pub async fn pending_engineers(&self) -> Result<Vec<Application>, ApiError> {
        let body = self.get("/admin/engineers/pending").await?;
        Ok(decode_list(&body, "engineers")?)
    }

    pub async fn approve_engineer(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/admin/engineers/{}/approve", segment(id)?);
        self.send_empty(Method::PUT, &path).await?;
        Ok(())
    }

    pub async fn reject_engineer(&self, id: &str, reason: &str) -> Result<(), ApiError> {
        let path = format!("/admin/engineers/{}/reject", segment(id)?);
        self.send_json(Method::PUT, &path, &json!({ "reason": reason })).await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<DashboardStats, ApiError> {
        let body = self.get("/admin/stats").await?;
        Ok(decode_enveloped(&body, "stats")?)
    }

    pub async fn dashboard(&self) -> Result<DashboardOverview, ApiError> {
        let body = self.get("/admin/dashboard").await?;
        Ok(decode_object(&body)?)
    }

    pub async fn create_admin(&self, admin: &NewAdmin) -> Result<(), ApiError> {
        if admin.email.trim().is_empty() || !admin.email.contains('@') {
            return Err(ApiError::Validation(format!("invalid email address: {:?}", admin.email)));
        }
        if admin.password.len() < 8 {
            return Err(ApiError::Validation("password must be at least 8 characters".to_string()));
        }
        self.send_json(Method::POST, "/admin/create-admin", admin).await?;
        Ok(())
    }

    pub async fn list_admins(&self) -> Result<Vec<AdminAccount>, ApiError> {
        let body = self.get("/admin/admins").await?;
        Ok(decode_list(&body, "admins")?)
    }

    pub async fn set_user_state(&self, id: &str, action: UserAction) -> Result<(), ApiError> {
        let id = segment(id)?;
        match action {
            UserAction::Activate => {
                self.send_empty(Method::PUT, &format!("/admin/users/{}/activate", id)).await?
            }
            UserAction::Suspend => {
                self.send_empty(Method::PUT, &format!("/admin/users/{}/suspend", id)).await?
            }
            UserAction::Deactivate => {
                self.send_empty(Method::DELETE, &format!("/admin/users/{}", id)).await?
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::admin::{ApplicationStatus, NewAdmin, UserAction};
    use crate::api::testing::client_for;
    use crate::error::{ApiError, ErrorCategory};
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_pending_engineers_envelope() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/admin/engineers/pending")
            .with_status(200)
            .with_body(
                r#"{"engineers": [
                    {"id": 1, "status": "pending",
                     "user": {"id": 10, "email": "a@x.io", "full_name": "A"}},
                    {"id": 2, "status": "pending",
                     "user": {"id": 11, "email": "b@x.io", "full_name": "B"}}
                ]}"#,
            )
            .create_async()
            .await;

        let apps = client_for(&server, None).pending_engineers().await.unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[1].user.email, "b@x.io");
        assert_eq!(apps[0].status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn test_pending_engineers_wrong_shape_is_parse_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/admin/engineers/pending")
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let err = client_for(&server, None).pending_engineers().await.unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
        assert_eq!(err.category(), ErrorCategory::Malformed);
    }

    #[tokio::test]
    async fn test_reject_sends_reason() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/v1/admin/engineers/3/reject")
            .match_body(Matcher::Json(serde_json::json!({"reason": "Incomplete profile"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client_for(&server, Some("t"))
            .reject_engineer("3", "Incomplete profile")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_user_actions_hit_expected_routes() {
        let mut server = Server::new_async().await;
        let activate = server
            .mock("PUT", "/api/v1/admin/users/5/activate")
            .with_status(200)
            .create_async()
            .await;
        let suspend = server
            .mock("PUT", "/api/v1/admin/users/5/suspend")
            .with_status(200)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/api/v1/admin/users/5")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server, Some("t"));
        client.set_user_state("5", UserAction::Activate).await.unwrap();
        client.set_user_state("5", UserAction::Suspend).await.unwrap();
        client.set_user_state("5", UserAction::Deactivate).await.unwrap();

        activate.assert_async().await;
        suspend.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_admin_validates_locally() {
        let server = Server::new_async().await;
        let client = client_for(&server, Some("t"));
        let err = client
            .create_admin(&NewAdmin {
                email: "not-an-email".into(),
                full_name: "X".into(),
                password: "longenough".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_create_admin_surfaces_server_detail() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v1/admin/create-admin")
            .with_status(400)
            .with_body(r#"{"detail": "Email already registered"}"#)
            .create_async()
            .await;

        let err = client_for(&server, Some("t"))
            .create_admin(&NewAdmin {
                email: "ops@example.com".into(),
                full_name: "Ops".into(),
                password: "correct-horse".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Email already registered");
    }
}
