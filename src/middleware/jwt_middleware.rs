/// JWT Authentication Middleware
///
/// Validates the bearer credential from the Authorization header and injects
/// the verified `Principal` into request extensions for route handlers.
/// Rejections go through `AppError`, so an expired credential answers with
/// `TOKEN_EXPIRED` and every other failure with its own code.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{validate_access_token, Principal};
use crate::configuration::JwtSettings;
use crate::error::{AccessTokenError, AppError};

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    jwt_config: JwtSettings,
}

impl JwtMiddleware {
    pub fn new(jwt_config: JwtSettings) -> Self {
        Self { jwt_config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            jwt_config: self.jwt_config.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    jwt_config: JwtSettings,
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AccessTokenError> {
    let header = header.ok_or(AccessTokenError::Missing)?;
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AccessTokenError::Malformed),
    }
}

fn authenticate(req: &ServiceRequest, jwt_config: &JwtSettings) -> Result<Principal, AppError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AccessTokenError::Malformed)?),
        None => None,
    };
    let token = bearer_token(header)?;
    let claims = validate_access_token(token, jwt_config)?;
    Principal::from_claims(&claims)
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req, &self.jwt_config) {
            Ok(principal) => {
                tracing::debug!(
                    principal_id = %principal.id,
                    role = %principal.role,
                    "Access token verified"
                );
                req.extensions_mut().insert(principal);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::warn!(path = %req.path(), error = %e, "Access token rejected");
                let error: Error = e.into();
                Box::pin(async move { Err(error) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(bearer_token(None), Err(AccessTokenError::Missing));
        assert_eq!(bearer_token(Some("Basic dXNlcg==")), Err(AccessTokenError::Malformed));
        assert_eq!(bearer_token(Some("Bearer ")), Err(AccessTokenError::Malformed));
    }
}
