use rusqlite::Connection;

/// Initialize the storefront schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Accounts (customers and admins)
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Login sessions (token stored hashed)
        CREATE TABLE IF NOT EXISTS auth_sessions (
            token_hash TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_auth_sessions_account ON auth_sessions(account_id);
        CREATE INDEX IF NOT EXISTS idx_auth_sessions_expiry ON auth_sessions(expires_at);

        -- Catalog
        -- Soft delete: deleted_at = timestamp when removed from sale, NULL = active.
        -- Rows are never hard-deleted so ledger lines and entitlements keep resolving.
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            price_cents INTEGER NOT NULL CHECK (price_cents > 0),
            category TEXT NOT NULL DEFAULT 'General',
            is_trending INTEGER NOT NULL DEFAULT 0,
            release_date TEXT,
            stock INTEGER NOT NULL DEFAULT 999,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_products_active ON products(id) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category) WHERE deleted_at IS NULL;

        -- Entitlement set: one row per (account, game). Grants are INSERT OR IGNORE.
        CREATE TABLE IF NOT EXISTS entitlements (
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL REFERENCES products(id),
            order_id TEXT,
            granted_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, product_id)
        );

        CREATE TABLE IF NOT EXISTS wishlist_items (
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL REFERENCES products(id),
            added_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, product_id)
        );

        -- Priced carts, written before the processor session is created
        CREATE TABLE IF NOT EXISTS checkout_intents (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            processor_session_id TEXT UNIQUE,
            items TEXT NOT NULL,
            total_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            consumed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_checkout_intents_account ON checkout_intents(account_id);

        -- Ledger
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            transaction_id TEXT NOT NULL,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            intent_id TEXT REFERENCES checkout_intents(id) ON DELETE SET NULL,
            total_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'cancelled')),
            source TEXT NOT NULL CHECK (source IN ('webhook', 'confirmation')),
            created_at INTEGER NOT NULL,
            propagated_at INTEGER
        );
        -- Exactly one completed entry per processor transaction
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_completed_tx
            ON orders(transaction_id) WHERE status = 'completed';
        CREATE INDEX IF NOT EXISTS idx_orders_account ON orders(account_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_orders_unpropagated
            ON orders(created_at) WHERE status = 'completed' AND propagated_at IS NULL;

        CREATE TABLE IF NOT EXISTS order_items (
            order_id TEXT NOT NULL REFERENCES orders(id),
            position INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            title TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            unit_price_cents INTEGER NOT NULL CHECK (unit_price_cents > 0),
            PRIMARY KEY (order_id, position)
        );

        -- Append-only ledger: only the propagation marker may change, and only once
        CREATE TRIGGER IF NOT EXISTS orders_immutable
        BEFORE UPDATE ON orders
        WHEN NEW.id IS NOT OLD.id
          OR NEW.transaction_id IS NOT OLD.transaction_id
          OR NEW.account_id IS NOT OLD.account_id
          OR NEW.total_cents IS NOT OLD.total_cents
          OR NEW.currency IS NOT OLD.currency
          OR NEW.status IS NOT OLD.status
          OR NEW.source IS NOT OLD.source
          OR NEW.created_at IS NOT OLD.created_at
          OR (OLD.propagated_at IS NOT NULL AND NEW.propagated_at IS NOT OLD.propagated_at)
        BEGIN
            SELECT RAISE(ABORT, 'ledger entries are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS orders_no_delete
        BEFORE DELETE ON orders
        BEGIN
            SELECT RAISE(ABORT, 'ledger entries cannot be deleted');
        END;

        CREATE TRIGGER IF NOT EXISTS order_items_immutable
        BEFORE UPDATE ON order_items
        BEGIN
            SELECT RAISE(ABORT, 'ledger entries are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS order_items_no_delete
        BEFORE DELETE ON order_items
        BEGIN
            SELECT RAISE(ABORT, 'ledger entries cannot be deleted');
        END;

        -- Support tickets
        CREATE TABLE IF NOT EXISTS support_tickets (
            id TEXT PRIMARY KEY,
            account_id TEXT REFERENCES accounts(id) ON DELETE SET NULL,
            email TEXT,
            category TEXT NOT NULL CHECK (category IN ('account', 'billing', 'orders', 'downloads', 'security')),
            subject TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'in_progress', 'closed')),
            meta TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_support_tickets_status ON support_tickets(status, created_at);
        "#,
    )
}
