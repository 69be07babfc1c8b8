//! In-memory stand-in for the Mercado API, used by the integration tests
//! and for local dry runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::delete;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

type Reply = (StatusCode, Json<Value>);

#[derive(Debug, Clone, Serialize)]
struct Market {
    id: u64,
    nome: String,
    cnpj: String,
    endereco: String,
    produtos: Produtos,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Produtos {
    hortifruit: Hortifruit,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Hortifruit {
    frutas: Vec<Item>,
    legumes: Vec<Item>,
}

#[derive(Debug, Clone, Serialize)]
struct Item {
    id: u64,
    nome: String,
    valor: f64,
}

#[derive(Debug, Deserialize)]
struct MarketInput {
    nome: String,
    cnpj: String,
    endereco: String,
}

#[derive(Debug, Deserialize)]
struct ItemInput {
    nome: String,
    valor: f64,
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    markets: BTreeMap<u64, Market>,
}

impl Store {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
}

impl AppState {
    fn lock(&self) -> MutexGuard<'_, Store> {
        // A poisoned store still holds consistent maps
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/mercado", get(list_markets).post(create_market))
        .route(
            "/mercado/{id}",
            get(get_market).put(update_market).delete(delete_market),
        )
        .route("/mercado/{id}/produtos", get(list_products))
        .route(
            "/mercado/{id}/produtos/hortifruit/{category}",
            get(list_items).post(create_item),
        )
        .route(
            "/mercado/{id}/produtos/hortifruit/{category}/{item_id}",
            delete(delete_item),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::default())
}

pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, app()).await
}

fn not_found(message: String) -> Reply {
    (StatusCode::NOT_FOUND, Json(json!({ "message": message })))
}

fn bad_request(message: String) -> Reply {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message })))
}

fn market_not_found(id: u64) -> Reply {
    not_found(format!("Mercado com ID {id} não encontrado."))
}

fn validate_market(input: &MarketInput) -> Result<(), Reply> {
    if input.nome.trim().is_empty() || input.endereco.trim().is_empty() {
        return Err(bad_request("nome e endereco são obrigatórios.".into()));
    }
    if input.cnpj.len() != 14 || !input.cnpj.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_request("cnpj deve ter 14 dígitos.".into()));
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

async fn list_markets(State(state): State<AppState>) -> Json<Value> {
    let store = state.lock();
    let markets: Vec<_> = store.markets.values().collect();
    Json(to_json(&markets))
}

async fn create_market(
    State(state): State<AppState>,
    Json(input): Json<MarketInput>,
) -> Result<Reply, Reply> {
    validate_market(&input)?;

    let mut store = state.lock();
    let id = store.allocate_id();
    let market = Market {
        id,
        nome: input.nome,
        cnpj: input.cnpj,
        endereco: input.endereco,
        produtos: Produtos::default(),
    };
    store.markets.insert(id, market.clone());

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Mercado '{}' criado com sucesso!", market.nome),
            "novoMercado": to_json(&market),
        })),
    ))
}

async fn get_market(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Reply> {
    let store = state.lock();
    let market = store.markets.get(&id).ok_or_else(|| market_not_found(id))?;
    Ok(Json(to_json(market)))
}

// The body is read raw so that a missing market wins over a missing or
// malformed body.
async fn update_market(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Reply, Reply> {
    let mut store = state.lock();
    let market = store.markets.get_mut(&id).ok_or_else(|| market_not_found(id))?;

    let input: MarketInput = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("Corpo da requisição inválido: {e}")))?;
    validate_market(&input)?;

    market.nome = input.nome;
    market.cnpj = input.cnpj;
    market.endereco = input.endereco;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": format!("Mercado com ID {id} atualizado com sucesso."),
            "mercado": to_json(market),
        })),
    ))
}

async fn delete_market(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Reply, Reply> {
    let mut store = state.lock();
    store.markets.remove(&id).ok_or_else(|| market_not_found(id))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": format!("Mercado com ID {id} deletado com sucesso.") })),
    ))
}

async fn list_products(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Reply> {
    let store = state.lock();
    let market = store.markets.get(&id).ok_or_else(|| market_not_found(id))?;
    Ok(Json(to_json(&market.produtos)))
}

fn category_mut<'a>(market: &'a mut Market, category: &str) -> Option<&'a mut Vec<Item>> {
    let hortifruit = &mut market.produtos.hortifruit;
    match category {
        "frutas" => Some(&mut hortifruit.frutas),
        "legumes" => Some(&mut hortifruit.legumes),
        _ => None,
    }
}

async fn list_items(
    State(state): State<AppState>,
    Path((id, category)): Path<(u64, String)>,
) -> Result<Json<Value>, Reply> {
    let mut store = state.lock();
    let market = store.markets.get_mut(&id).ok_or_else(|| market_not_found(id))?;
    let items = category_mut(market, &category)
        .ok_or_else(|| not_found(format!("Categoria '{category}' não encontrada.")))?;
    Ok(Json(to_json(items)))
}

async fn create_item(
    State(state): State<AppState>,
    Path((id, category)): Path<(u64, String)>,
    Json(input): Json<ItemInput>,
) -> Result<Reply, Reply> {
    if input.nome.trim().is_empty() {
        return Err(bad_request("nome é obrigatório.".into()));
    }

    let mut store = state.lock();
    if !store.markets.contains_key(&id) {
        return Err(market_not_found(id));
    }
    let item_id = store.allocate_id();

    let market = store.markets.get_mut(&id).ok_or_else(|| market_not_found(id))?;
    let items = category_mut(market, &category)
        .ok_or_else(|| not_found(format!("Categoria '{category}' não encontrada.")))?;

    let item = Item {
        id: item_id,
        nome: input.nome,
        valor: input.valor,
    };
    items.push(item.clone());

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Produto '{}' adicionado com sucesso.", item.nome),
            "product_item": to_json(&item),
        })),
    ))
}

async fn delete_item(
    State(state): State<AppState>,
    Path((id, category, item_id)): Path<(u64, String, u64)>,
) -> Result<Reply, Reply> {
    let mut store = state.lock();
    let market = store.markets.get_mut(&id).ok_or_else(|| market_not_found(id))?;
    let items = category_mut(market, &category)
        .ok_or_else(|| not_found(format!("Categoria '{category}' não encontrada.")))?;

    let position = items
        .iter()
        .position(|item| item.id == item_id)
        .ok_or_else(|| not_found(format!("Produto com ID {item_id} não encontrado.")))?;
    items.remove(position);

    Ok((
        StatusCode::OK,
        Json(json!({ "message": format!("Produto com ID {item_id} removido com sucesso.") })),
    ))
}
