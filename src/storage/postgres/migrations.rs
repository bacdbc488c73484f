use sqlx::PgPool;

/// Creates every table and index the store needs. Safe to run repeatedly.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // ═══════════════════════════════════════
    // TABLE: member
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS member (
            id          BIGSERIAL PRIMARY KEY,
            email       TEXT      NOT NULL UNIQUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // ═══════════════════════════════════════
    // TABLE: product
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS product (
            id          BIGSERIAL PRIMARY KEY,
            name        TEXT      NOT NULL,
            price       BIGINT    NOT NULL CHECK (price >= 0),
            image_url   TEXT
        )",
    )
    .execute(pool)
    .await?;

    // ═══════════════════════════════════════
    // TABLE: cart_item
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS cart_item (
            id          BIGSERIAL PRIMARY KEY,
            member_id   BIGINT    NOT NULL REFERENCES member(id),
            product_id  BIGINT    NOT NULL REFERENCES product(id),
            quantity    INTEGER   NOT NULL CHECK (quantity > 0)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cart_item_member ON cart_item(member_id)")
        .execute(pool)
        .await?;

    // ═══════════════════════════════════════
    // TABLE: coupon
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS coupon (
            id              BIGSERIAL PRIMARY KEY,
            name            TEXT      NOT NULL UNIQUE,
            discount_type   TEXT      NOT NULL CHECK (discount_type IN ('EMPTY', 'DEDUCTION', 'RATE')),
            minimum_price   BIGINT    NOT NULL DEFAULT 0,
            discount_price  BIGINT    NOT NULL DEFAULT 0,
            discount_rate   DOUBLE PRECISION NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    // ═══════════════════════════════════════
    // TABLE: member_coupon
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS member_coupon (
            id              BIGSERIAL PRIMARY KEY,
            member_id       BIGINT    NOT NULL REFERENCES member(id),
            coupon_id       BIGINT    NOT NULL REFERENCES coupon(id),
            availability    BOOLEAN   NOT NULL DEFAULT TRUE,
            source_order_id BIGINT,
            CONSTRAINT member_coupon_source_order_unique UNIQUE (source_order_id)
        )",
    )
    .execute(pool)
    .await?;

    // One active, non-bonus grant per member and coupon
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS member_coupon_active_unique
            ON member_coupon(member_id, coupon_id)
            WHERE availability AND source_order_id IS NULL",
    )
    .execute(pool)
    .await?;

    // ═══════════════════════════════════════
    // TABLE: orders
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id                BIGSERIAL PRIMARY KEY,
            member_id         BIGINT    NOT NULL REFERENCES member(id),
            member_coupon_id  BIGINT    REFERENCES member_coupon(id),
            original_price    BIGINT    NOT NULL CHECK (original_price >= 0),
            discount_price    BIGINT    NOT NULL CHECK (discount_price >= 0),
            confirm_state     BOOLEAN   NOT NULL DEFAULT FALSE,
            ordered_at        TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_member ON orders(member_id, id DESC)")
        .execute(pool)
        .await?;

    // ═══════════════════════════════════════
    // TABLE: order_item
    // ═══════════════════════════════════════
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS order_item (
            id            BIGSERIAL PRIMARY KEY,
            order_id      BIGINT    NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id    BIGINT    NOT NULL,
            product_name  TEXT      NOT NULL,
            unit_price    BIGINT    NOT NULL,
            quantity      INTEGER   NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_item_order ON order_item(order_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database schema is up to date");
    Ok(())
}
