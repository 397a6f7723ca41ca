use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use shared_config::PaymentGatewayConfig;
use shared_models::payment::PaymentKind;

use crate::models::{
    GatewayCallback, GatewayCreateRequest, GatewayCreateResponse, GatewayOrder, PaymentError,
    PaymentReference, Settlement,
};

type HmacSha256 = Hmac<Sha256>;

/// Transport attempts per create request.
const MAX_ATTEMPTS: u32 = 2;

/// Port to the external wallet gateway. Only starting a payment needs the
/// network; callbacks are parsed locally by [`parse_callback`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, order: GatewayOrder)
        -> Result<GatewayCreateResponse, PaymentError>;
}

// ==============================================================================
// SIGNING
// ==============================================================================

/// Lowercase hex HMAC-SHA256 of `raw`.
pub fn sign(secret: &str, raw: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_signature(secret: &str, raw: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Fields of a create request in the order the gateway signs them.
pub fn create_signature_payload(access_key: &str, request: &GatewayCreateRequest) -> String {
    format!(
        "accessKey={}&amount={}&extraData={}&ipnUrl={}&orderId={}&orderInfo={}&partnerCode={}&redirectUrl={}&requestId={}&requestType={}",
        access_key,
        request.amount,
        request.extra_data,
        request.ipn_url,
        request.order_id,
        request.order_info,
        request.partner_code,
        request.redirect_url,
        request.request_id,
        request.request_type,
    )
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// Fields of a callback in the order the gateway signs them.
pub fn callback_signature_payload(access_key: &str, callback: &GatewayCallback) -> String {
    format!(
        "accessKey={}&amount={}&extraData={}&message={}&orderId={}&orderInfo={}&orderType={}&partnerCode={}&payType={}&requestId={}&responseTime={}&resultCode={}&transId={}",
        access_key,
        opt(&callback.amount),
        callback.extra_data,
        callback.message,
        callback.order_id,
        callback.order_info,
        callback.order_type,
        callback.partner_code,
        callback.pay_type,
        callback.request_id,
        opt(&callback.response_time),
        opt(&callback.result_code),
        opt(&callback.trans_id),
    )
}

pub fn encode_reference(reference: &PaymentReference) -> String {
    let json = serde_json::to_string(reference).unwrap_or_default();
    STANDARD.encode(json)
}

pub fn decode_reference(extra_data: &str) -> Result<PaymentReference, PaymentError> {
    let bytes = STANDARD
        .decode(extra_data.trim())
        .map_err(|e| PaymentError::MalformedCallback(format!("extraData is not base64: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PaymentError::MalformedCallback(format!("extraData is not a reference: {}", e)))
}

/// `{owner_id}_{unix_ms}`.
pub fn order_id_for(owner_id: i64, unix_ms: i64) -> String {
    format!("{}_{}", owner_id, unix_ms)
}

/// Owner id encoded in an order id, split at the last `_`.
pub fn owner_from_order_id(order_id: &str) -> Option<i64> {
    let (owner, _) = order_id.rsplit_once('_')?;
    owner.parse().ok()
}

// ==============================================================================
// CALLBACK PARSING
// ==============================================================================

/// Structural validation of a gateway callback for `kind` #`route_id`.
///
/// The owner is identified three ways (route, `extraData`, order id prefix)
/// and all three must agree. A present signature must verify; an absent one
/// is tolerated unless `require_signed_callbacks` is set. Nothing here looks
/// at stored payments.
pub fn parse_callback(
    config: &PaymentGatewayConfig,
    kind: PaymentKind,
    route_id: i64,
    payload: &Value,
) -> Result<Settlement, PaymentError> {
    let callback: GatewayCallback = serde_json::from_value(payload.clone())
        .map_err(|e| PaymentError::MalformedCallback(e.to_string()))?;

    let reference = decode_reference(&callback.extra_data)?;
    if reference.kind != kind {
        return Err(PaymentError::IdMismatch(format!(
            "extraData names a {} payment",
            reference.kind
        )));
    }
    if reference.id != route_id {
        return Err(PaymentError::IdMismatch(format!(
            "extraData id {} differs from {}",
            reference.id, route_id
        )));
    }

    let order_owner = owner_from_order_id(&callback.order_id).ok_or_else(|| {
        PaymentError::MalformedCallback(format!("unrecognised order id {:?}", callback.order_id))
    })?;
    if order_owner != route_id {
        return Err(PaymentError::IdMismatch(format!(
            "order id {} belongs to {}",
            callback.order_id, order_owner
        )));
    }

    match callback.signature.as_deref().filter(|s| !s.is_empty()) {
        Some(signature) => {
            let raw = callback_signature_payload(&config.access_key, &callback);
            if !verify_signature(&config.secret_key, &raw, signature) {
                return Err(PaymentError::InvalidSignature);
            }
        }
        None if config.require_signed_callbacks => return Err(PaymentError::UnsignedCallback),
        None => debug!("Accepting unsigned callback for {} {}", kind, route_id),
    }

    let result_code = callback
        .result_code
        .ok_or_else(|| PaymentError::MalformedCallback("resultCode is missing".to_string()))?;

    Ok(Settlement {
        order_id: Some(callback.order_id),
        result_code,
        amount: callback.amount,
        transaction_ref: callback.trans_id.map(|id| id.to_string()),
        payment_method: Some(callback.pay_type)
            .filter(|p| !p.is_empty())
            .or_else(|| Some("wallet".to_string())),
    })
}

// ==============================================================================
// HTTP CLIENT
// ==============================================================================

/// Wallet gateway over HTTPS.
#[derive(Debug)]
pub struct HttpPaymentGateway {
    client: Client,
    config: PaymentGatewayConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, PaymentError> {
        if config.partner_code.is_empty()
            || config.access_key.is_empty()
            || config.secret_key.is_empty()
        {
            return Err(PaymentError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                error!("Failed to build gateway client: {}", e);
                PaymentError::NotConfigured
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn ipn_url(&self, kind: PaymentKind, owner_id: i64) -> String {
        format!(
            "{}/payments/{}/{}/callback",
            self.config.ipn_base_url.trim_end_matches('/'),
            kind.path_segment(),
            owner_id
        )
    }

    pub fn build_request(&self, order: &GatewayOrder) -> GatewayCreateRequest {
        let mut request = GatewayCreateRequest {
            partner_code: self.config.partner_code.clone(),
            request_id: order.order_id.clone(),
            amount: order.amount,
            order_id: order.order_id.clone(),
            order_info: order.order_info.clone(),
            redirect_url: self.config.redirect_url.clone(),
            ipn_url: self.ipn_url(order.kind, order.owner_id),
            lang: self.config.lang.clone(),
            request_type: self.config.request_type.clone(),
            extra_data: encode_reference(&PaymentReference {
                kind: order.kind,
                id: order.owner_id,
            }),
            signature: String::new(),
        };
        let raw = create_signature_payload(&self.config.access_key, &request);
        request.signature = sign(&self.config.secret_key, &raw);
        request
    }

    async fn send(&self, request: &GatewayCreateRequest) -> Result<reqwest::Response, PaymentError> {
        let mut attempt = 1;
        loop {
            match self
                .client
                .post(&self.config.endpoint)
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!("Gateway request for order {} failed, retrying: {}", request.order_id, e);
                    attempt += 1;
                }
                Err(e) => {
                    error!("Gateway unreachable for order {}: {}", request.order_id, e);
                    return Err(PaymentError::GatewayUnavailable(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(
        &self,
        order: GatewayOrder,
    ) -> Result<GatewayCreateResponse, PaymentError> {
        let request = self.build_request(&order);
        debug!("Creating gateway payment {} for {}", request.order_id, request.amount);

        let response = self.send(&request).await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::GatewayUnavailable(e.to_string()))?;

        if status.is_server_error() {
            error!("Gateway error {} for order {}: {}", status, order.order_id, text);
            return Err(PaymentError::GatewayUnavailable(format!("HTTP {}", status)));
        }

        let parsed: GatewayCreateResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Unreadable gateway response ({}): {}", status, text);
            PaymentError::GatewayRejected {
                code: i64::from(status.as_u16()),
                message: format!("unreadable response: {}", e),
            }
        })?;

        if parsed.result_code != 0 || parsed.pay_url.is_none() {
            warn!(
                "Gateway declined order {}: {} {:?}",
                order.order_id, parsed.result_code, parsed.message
            );
            return Err(PaymentError::GatewayRejected {
                code: parsed.result_code,
                message: parsed.message.unwrap_or_else(|| "no payment url".to_string()),
            });
        }

        info!("Gateway accepted order {}", order.order_id);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> PaymentGatewayConfig {
        PaymentGatewayConfig {
            endpoint: endpoint.to_string(),
            partner_code: "MOMOTEST".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            redirect_url: "http://localhost/result".to_string(),
            ipn_base_url: "http://api.local/".to_string(),
            timeout_seconds: 2,
            ..Default::default()
        }
    }

    fn order() -> GatewayOrder {
        GatewayOrder {
            kind: PaymentKind::Appointment,
            owner_id: 42,
            order_id: "42_1767225600000".to_string(),
            amount: 200_000,
            order_info: "Appointment #42".to_string(),
        }
    }

    fn callback(route_id: i64, result_code: i64, amount: i64) -> GatewayCallback {
        GatewayCallback {
            partner_code: "MOMOTEST".to_string(),
            order_id: format!("{}_1767225600000", route_id),
            request_id: format!("{}_1767225600000", route_id),
            amount: Some(amount),
            order_info: "Appointment".to_string(),
            order_type: "momo_wallet".to_string(),
            trans_id: Some(4_088_878_653),
            result_code: Some(result_code),
            message: "Successful.".to_string(),
            pay_type: "qr".to_string(),
            response_time: Some(1_767_225_700_000),
            extra_data: encode_reference(&PaymentReference {
                kind: PaymentKind::Appointment,
                id: route_id,
            }),
            signature: None,
        }
    }

    fn signed(mut callback: GatewayCallback, secret: &str) -> Value {
        let raw = callback_signature_payload("access", &callback);
        callback.signature = Some(sign(secret, &raw));
        serde_json::to_value(callback).unwrap()
    }

    #[test]
    fn create_payload_keeps_field_order() {
        let gateway = HttpPaymentGateway::new(&config("http://gw.local/create")).unwrap();
        let request = gateway.build_request(&order());
        let raw = create_signature_payload("access", &request);

        assert_eq!(
            raw,
            format!(
                "accessKey=access&amount=200000&extraData={}&ipnUrl=http://api.local/payments/appointments/42/callback&orderId=42_1767225600000&orderInfo=Appointment #42&partnerCode=MOMOTEST&redirectUrl=http://localhost/result&requestId=42_1767225600000&requestType=captureWallet",
                request.extra_data
            )
        );
        assert_eq!(request.signature.len(), 64);
        assert!(verify_signature("secret", &raw, &request.signature));
        assert!(!verify_signature("other", &raw, &request.signature));
    }

    #[test]
    fn reference_round_trips_through_extra_data() {
        let reference = PaymentReference {
            kind: PaymentKind::RetailPrescription,
            id: 7,
        };
        let encoded = encode_reference(&reference);
        assert_eq!(
            STANDARD.decode(&encoded).unwrap(),
            br#"{"kind":"retail_prescription","id":7}"#.to_vec()
        );
        assert_eq!(decode_reference(&encoded).unwrap(), reference);
        assert_matches!(decode_reference("%%%"), Err(PaymentError::MalformedCallback(_)));
    }

    #[test]
    fn order_id_splits_at_last_underscore() {
        assert_eq!(order_id_for(42, 1_767_225_600_000), "42_1767225600000");
        assert_eq!(owner_from_order_id("42_1767225600000"), Some(42));
        assert_eq!(owner_from_order_id("shop_42_1767225600000"), None);
        assert_eq!(owner_from_order_id("42"), None);
    }

    #[test]
    fn signed_callback_is_parsed() {
        let payload = signed(callback(42, 0, 200_000), "secret");
        let settlement =
            parse_callback(&config("http://gw.local"), PaymentKind::Appointment, 42, &payload)
                .unwrap();

        assert_eq!(settlement.order_id.as_deref(), Some("42_1767225600000"));
        assert_eq!(settlement.result_code, 0);
        assert_eq!(settlement.amount, Some(200_000));
        assert_eq!(settlement.transaction_ref.as_deref(), Some("4088878653"));
        assert_eq!(settlement.payment_method.as_deref(), Some("qr"));
    }

    #[test]
    fn tampered_callback_is_rejected() {
        let mut payload = signed(callback(42, 0, 200_000), "secret");
        payload["amount"] = json!(1_000);
        assert_matches!(
            parse_callback(&config("http://gw.local"), PaymentKind::Appointment, 42, &payload),
            Err(PaymentError::InvalidSignature)
        );

        let forged = signed(callback(42, 0, 200_000), "not-the-secret");
        assert_matches!(
            parse_callback(&config("http://gw.local"), PaymentKind::Appointment, 42, &forged),
            Err(PaymentError::InvalidSignature)
        );
    }

    #[test]
    fn unsigned_callback_depends_on_policy() {
        let payload = serde_json::to_value(callback(42, 0, 200_000)).unwrap();
        let mut config = config("http://gw.local");
        assert!(parse_callback(&config, PaymentKind::Appointment, 42, &payload).is_ok());

        config.require_signed_callbacks = true;
        assert_matches!(
            parse_callback(&config, PaymentKind::Appointment, 42, &payload),
            Err(PaymentError::UnsignedCallback)
        );
    }

    #[test]
    fn every_id_must_match_the_route() {
        let config = config("http://gw.local");

        let payload = serde_json::to_value(callback(43, 0, 200_000)).unwrap();
        assert_matches!(
            parse_callback(&config, PaymentKind::Appointment, 42, &payload),
            Err(PaymentError::IdMismatch(_))
        );

        let mut other_order = callback(42, 0, 200_000);
        other_order.order_id = "43_1767225600000".to_string();
        let payload = serde_json::to_value(other_order).unwrap();
        assert_matches!(
            parse_callback(&config, PaymentKind::Appointment, 42, &payload),
            Err(PaymentError::IdMismatch(_))
        );

        let payload = serde_json::to_value(callback(42, 0, 200_000)).unwrap();
        assert_matches!(
            parse_callback(&config, PaymentKind::Prescription, 42, &payload),
            Err(PaymentError::IdMismatch(_))
        );
    }

    #[tokio::test]
    async fn gateway_success_returns_pay_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/gateway/api/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "partnerCode": "MOMOTEST",
                "orderId": "42_1767225600000",
                "requestId": "42_1767225600000",
                "amount": 200000,
                "responseTime": 1767225600100i64,
                "message": "Successful.",
                "resultCode": 0,
                "payUrl": "https://pay.local/42"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway =
            HttpPaymentGateway::new(&config(&format!("{}/v2/gateway/api/create", server.uri())))
                .unwrap();
        let response = gateway.create_payment(order()).await.unwrap();
        assert_eq!(response.pay_url.as_deref(), Some("https://pay.local/42"));
    }

    #[tokio::test]
    async fn gateway_decline_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultCode": 22,
                "message": "Amount out of range"
            })))
            .mount(&server)
            .await;

        let gateway = HttpPaymentGateway::new(&config(&server.uri())).unwrap();
        assert_matches!(
            gateway.create_payment(order()).await,
            Err(PaymentError::GatewayRejected { code: 22, .. })
        );
    }

    #[tokio::test]
    async fn unreachable_gateway_is_retryable() {
        let gateway = HttpPaymentGateway::new(&config("http://127.0.0.1:9/create")).unwrap();
        assert_matches!(
            gateway.create_payment(order()).await,
            Err(PaymentError::GatewayUnavailable(_))
        );
    }

    #[test]
    fn missing_credentials_are_reported() {
        let mut config = config("http://gw.local");
        config.secret_key.clear();
        assert_matches!(HttpPaymentGateway::new(&config), Err(PaymentError::NotConfigured));
    }
}
